//! Error classification shared by every kernel layer.
//!
//! Each layer (bus, flow, state, dispatch, config, persistence) keeps
//! its own error enum, and all of them implement [`ErrorCode`] so retry
//! logic and logging can treat errors uniformly without downcasting.
//!
//! # Classes
//!
//! The kernel sorts errors into three behavioral classes:
//!
//! | Class | `is_recoverable` | Handling |
//! |-------|------------------|----------|
//! | validation | `false` | rejected immediately, never retried |
//! | transient | `true` | bounded retry with backoff |
//! | initialization | varies | retried, then degraded mode, then fatal |
//!
//! # Example
//!
//! ```
//! use switchyard_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum DeliveryError {
//!     TargetUnreachable,
//!     BadPayload,
//! }
//!
//! impl ErrorCode for DeliveryError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::TargetUnreachable => "FLOW_TARGET_UNREACHABLE",
//!             Self::BadPayload => "FLOW_BAD_PAYLOAD",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::TargetUnreachable)
//!     }
//! }
//!
//! assert!(DeliveryError::TargetUnreachable.is_recoverable());
//! assert!(!DeliveryError::BadPayload.is_recoverable());
//! ```

/// Machine-readable code and retry class for a kernel error.
///
/// # Code Format
///
/// Codes are UPPER_SNAKE_CASE, prefixed with the owning layer
/// (`EVENT_`, `FLOW_`, `STATE_`, `DISPATCH_`, `CONFIG_`, `PERSIST_`,
/// `MODULE_`, `OFFLOAD_`), and stable once published. Logs, telemetry
/// payloads, and execution reports carry the code, never the Rust
/// variant name.
///
/// # Recoverability
///
/// `is_recoverable` answers one question: could the same call succeed
/// later without a code or input change? Timeouts and unreachable
/// collaborators can; malformed paths and unknown domains cannot.
pub trait ErrorCode {
    /// Returns the stable machine-readable code for this error.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the failed operation may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error's code is well formed and carries the
/// expected layer prefix.
///
/// Used by every error enum's conformance test.
///
/// # Panics
///
/// Panics with the offending code when the format or prefix is wrong.
///
/// # Example
///
/// ```
/// use switchyard_types::{assert_error_code, ErrorCode};
///
/// #[derive(Debug)]
/// struct Full;
///
/// impl ErrorCode for Full {
///     fn code(&self) -> &'static str { "STATE_QUEUE_FULL" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Full, "STATE_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{code}' is missing the '{expected_prefix}' prefix"
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{code}' is not UPPER_SNAKE_CASE"
    );
}

/// Asserts [`assert_error_code`] over every variant of an enum.
///
/// Error modules keep an `all_variants()` helper in their tests and
/// feed it through here.
///
/// # Example
///
/// ```
/// use switchyard_types::{assert_error_codes, ErrorCode};
///
/// #[derive(Debug)]
/// enum E { A, B }
///
/// impl ErrorCode for E {
///     fn code(&self) -> &'static str {
///         match self {
///             Self::A => "FLOW_A",
///             Self::B => "FLOW_B",
///         }
///     }
///     fn is_recoverable(&self) -> bool { false }
/// }
///
/// assert_error_codes(&[E::A, E::B], "FLOW_");
/// ```
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Checks the UPPER_SNAKE_CASE shape: ascii uppercase, digits, and
/// single interior underscores only.
fn is_upper_snake_case(s: &str) -> bool {
    let well_shaped = !s.starts_with('_') && !s.ends_with('_') && !s.contains("__");
    well_shaped
        && !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum SampleError {
        Retryable,
        Fatal,
    }

    impl ErrorCode for SampleError {
        fn code(&self) -> &'static str {
            match self {
                Self::Retryable => "SAMPLE_RETRYABLE",
                Self::Fatal => "SAMPLE_FATAL",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Retryable)
        }
    }

    #[test]
    fn codes_and_recoverability() {
        assert_eq!(SampleError::Retryable.code(), "SAMPLE_RETRYABLE");
        assert!(SampleError::Retryable.is_recoverable());
        assert!(!SampleError::Fatal.is_recoverable());
    }

    #[test]
    fn conformance_helpers_accept_valid_codes() {
        assert_error_code(&SampleError::Fatal, "SAMPLE_");
        assert_error_codes(&[SampleError::Retryable, SampleError::Fatal], "SAMPLE_");
    }

    #[test]
    #[should_panic(expected = "missing the")]
    fn conformance_helpers_reject_wrong_prefix() {
        assert_error_code(&SampleError::Fatal, "OTHER_");
    }

    #[test]
    fn snake_case_shape() {
        assert!(is_upper_snake_case("FLOW_RETRY_EXHAUSTED"));
        assert!(is_upper_snake_case("EVENT_2PC"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("flow_retry"));
        assert!(!is_upper_snake_case("_FLOW"));
        assert!(!is_upper_snake_case("FLOW_"));
        assert!(!is_upper_snake_case("FLOW__RETRY"));
        assert!(!is_upper_snake_case("Flow_Retry"));
    }
}
