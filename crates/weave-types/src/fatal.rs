//! Contract violations.
//!
//! Calling undo with nothing to undo, declaring a class twice, mutating the
//! graph from an observer callback: these are caller bugs, not runtime
//! conditions. They go through [`fatal!`](crate::fatal!), which logs the
//! message and then panics, or aborts when the crate is built with the
//! `abort-on-fatal` feature.

/// Terminate the current operation after a contract violation.
#[doc(hidden)]
#[cold]
pub fn raise(message: String) -> ! {
    if cfg!(feature = "abort-on-fatal") {
        eprintln!("weave fatal: {message}");
        std::process::abort()
    }
    panic!("{message}")
}

/// Report a contract violation and terminate the current operation.
///
/// ```should_panic
/// weave_types::fatal!("undo requested with empty history");
/// ```
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::__tracing::error!(target: "weave::fatal", "{}", message);
        $crate::fatal::raise(message)
    }};
}
