//! ---
//! cosim_section: "03-logging"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Context-enriched logging macros."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
#[doc(hidden)]
#[macro_export]
macro_rules! __cosim_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            run = ctx.run.unwrap_or(""),
            turbine = ctx.turbine.unwrap_or_default(),
            iteration = ctx.iteration.unwrap_or_default(),
            phase = ctx.phase.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with co-simulation context.
#[macro_export]
macro_rules! cosim_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cosim_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cosim_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with co-simulation context.
#[macro_export]
macro_rules! cosim_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cosim_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cosim_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with co-simulation context.
#[macro_export]
macro_rules! cosim_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__cosim_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__cosim_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}
