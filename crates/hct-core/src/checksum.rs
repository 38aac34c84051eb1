//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Update engine: manifest retrieval, artifact transfer and orchestration."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use blake2::{Blake2b512, Blake2s256};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512, Sha512_224, Sha512_256};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};

use crate::error::ChecksumError;

const READ_CHUNK: usize = 64 * 1024;

/// Digest algorithms accepted in manifest checksums.
///
/// Names follow the update server's convention (`sha256`, `sha3_256`,
/// `blake2b`); parsing ignores case, `-` and `_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
    Blake2b,
    Blake2s,
}

impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 14] = [
        ChecksumAlgorithm::Md5,
        ChecksumAlgorithm::Sha1,
        ChecksumAlgorithm::Sha224,
        ChecksumAlgorithm::Sha256,
        ChecksumAlgorithm::Sha384,
        ChecksumAlgorithm::Sha512,
        ChecksumAlgorithm::Sha512_224,
        ChecksumAlgorithm::Sha512_256,
        ChecksumAlgorithm::Sha3_224,
        ChecksumAlgorithm::Sha3_256,
        ChecksumAlgorithm::Sha3_384,
        ChecksumAlgorithm::Sha3_512,
        ChecksumAlgorithm::Blake2b,
        ChecksumAlgorithm::Blake2s,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha224 => "sha224",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha384 => "sha384",
            ChecksumAlgorithm::Sha512 => "sha512",
            ChecksumAlgorithm::Sha512_224 => "sha512_224",
            ChecksumAlgorithm::Sha512_256 => "sha512_256",
            ChecksumAlgorithm::Sha3_224 => "sha3_224",
            ChecksumAlgorithm::Sha3_256 => "sha3_256",
            ChecksumAlgorithm::Sha3_384 => "sha3_384",
            ChecksumAlgorithm::Sha3_512 => "sha3_512",
            ChecksumAlgorithm::Blake2b => "blake2b",
            ChecksumAlgorithm::Blake2s => "blake2s",
        }
    }

    fn digest_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Md5 => 16,
            ChecksumAlgorithm::Sha1 => 20,
            ChecksumAlgorithm::Sha224 | ChecksumAlgorithm::Sha512_224 | ChecksumAlgorithm::Sha3_224 => 28,
            ChecksumAlgorithm::Sha256
            | ChecksumAlgorithm::Sha512_256
            | ChecksumAlgorithm::Sha3_256
            | ChecksumAlgorithm::Blake2s => 32,
            ChecksumAlgorithm::Sha384 | ChecksumAlgorithm::Sha3_384 => 48,
            ChecksumAlgorithm::Sha512 | ChecksumAlgorithm::Sha3_512 | ChecksumAlgorithm::Blake2b => 64,
        }
    }

    fn hash_file(&self, path: &Path) -> Result<String, ChecksumError> {
        match self {
            ChecksumAlgorithm::Md5 => hash_file::<Md5>(path),
            ChecksumAlgorithm::Sha1 => hash_file::<Sha1>(path),
            ChecksumAlgorithm::Sha224 => hash_file::<Sha224>(path),
            ChecksumAlgorithm::Sha256 => hash_file::<Sha256>(path),
            ChecksumAlgorithm::Sha384 => hash_file::<Sha384>(path),
            ChecksumAlgorithm::Sha512 => hash_file::<Sha512>(path),
            ChecksumAlgorithm::Sha512_224 => hash_file::<Sha512_224>(path),
            ChecksumAlgorithm::Sha512_256 => hash_file::<Sha512_256>(path),
            ChecksumAlgorithm::Sha3_224 => hash_file::<Sha3_224>(path),
            ChecksumAlgorithm::Sha3_256 => hash_file::<Sha3_256>(path),
            ChecksumAlgorithm::Sha3_384 => hash_file::<Sha3_384>(path),
            ChecksumAlgorithm::Sha3_512 => hash_file::<Sha3_512>(path),
            ChecksumAlgorithm::Blake2b => hash_file::<Blake2b512>(path),
            ChecksumAlgorithm::Blake2s => hash_file::<Blake2s256>(path),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = ChecksumError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(raw);
        ChecksumAlgorithm::ALL
            .into_iter()
            .find(|algorithm| normalize(algorithm.as_str()) == wanted)
            .ok_or_else(|| ChecksumError::UnsupportedAlgorithm(raw.trim().to_owned()))
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected digest of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    algorithm: ChecksumAlgorithm,
    digest: String,
}

impl Checksum {
    /// Parse `<algorithm>:<hex>`. A bare digest or an empty algorithm means SHA-256.
    pub fn parse(raw: &str) -> Result<Self, ChecksumError> {
        let raw = raw.trim();
        let (algorithm, digest) = match raw.split_once(':') {
            Some((algorithm, digest)) if !algorithm.trim().is_empty() => {
                (algorithm.parse::<ChecksumAlgorithm>()?, digest)
            }
            Some((_, digest)) => (ChecksumAlgorithm::Sha256, digest),
            None => (ChecksumAlgorithm::Sha256, raw),
        };

        let digest = digest.trim().to_ascii_lowercase();
        let well_formed = digest.len() == algorithm.digest_len() * 2
            && digest.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(ChecksumError::Malformed(digest));
        }
        Ok(Self { algorithm, digest })
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Hash `path` and compare against the expected digest, case-insensitively.
    pub fn verify_file(&self, path: &Path) -> Result<(), ChecksumError> {
        let actual = self.algorithm.hash_file(path)?;
        if actual != self.digest {
            return Err(ChecksumError::Mismatch {
                algorithm: self.algorithm.to_string(),
                expected: self.digest.clone(),
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

fn hash_file<D: Digest>(path: &Path) -> Result<String, ChecksumError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
