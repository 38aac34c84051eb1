//! ---
//! hct_section: "03-persistence-logging"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Structured logging adapters and sinks."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
//! Leveled logging macros that stamp every event with a [`crate::LogContext`].

#[doc(hidden)]
#[macro_export]
macro_rules! __hct_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            component = ctx.component.unwrap_or(""),
            stage = ctx.stage.unwrap_or(""),
            version = ctx.version.unwrap_or(""),
            run = ctx.run.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with update context.
#[macro_export]
macro_rules! hct_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__hct_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__hct_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with update context.
#[macro_export]
macro_rules! hct_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__hct_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__hct_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with update context.
#[macro_export]
macro_rules! hct_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__hct_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__hct_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with update context.
#[macro_export]
macro_rules! hct_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__hct_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__hct_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
