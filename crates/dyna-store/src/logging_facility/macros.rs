//! Canonical logging macros
//!
//! These macros provide a structured, consistent way to log operations.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use dyna_store::log_op_start;
/// log_op_start!("reset");
/// log_op_start!("reset", path = "profile.user");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = dyna_core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = dyna_core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use dyna_store::log_op_end;
/// log_op_end!("reset", duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = dyna_core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = dyna_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// The error must expose a stable `code()` string.
///
/// # Example
///
/// ```
/// # use dyna_store::log_op_error;
/// # use dyna_store::errors::LayerError;
/// let err = LayerError::Io { message: "disk full".to_string() };
/// log_op_error!("persist_write", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = dyna_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_code = $err.code(),
            error = %$err,
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = dyna_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_code = $err.code(),
            error = %$err,
            $($field)*
        );
    }};
}
