//! Error types for the bitonic sorter.
//!
//! Three kinds of failure abort a sort call: bad configuration, an unusable
//! device capability, and a fault while talking to the execution substrate.
//! None are recovered locally. An array that simply ends up unsorted is not
//! an error; it is reported through [`crate::SortOutcome::sorted`].

use thiserror::Error;

/// Failure raised by an execution substrate.
#[derive(Debug, Error)]
pub enum SubstrateError {
    /// The substrate (device, thread pool) could not be brought up.
    #[error("substrate unavailable: {0}")]
    Unavailable(String),
    /// A round could not be dispatched or did not complete.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    /// Copying the array into or out of the substrate buffer failed.
    #[error("buffer transfer failed: {0}")]
    Transfer(String),
}

/// Failure of a sort call.
#[derive(Debug, Error)]
pub enum SortError {
    /// The requested size or tile width is invalid. Raised before any round runs.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The substrate cannot provide a usable work-group width.
    #[error("capability error: {0}")]
    Capability(String),
    /// A step of the sort failed on the substrate. The array contents are unspecified.
    #[error("execution failed at {step}: {source}")]
    Execution {
        step: String,
        #[source]
        source: SubstrateError,
    },
}

impl SortError {
    pub(crate) fn execution(step: impl Into<String>, source: SubstrateError) -> Self {
        SortError::Execution {
            step: step.into(),
            source,
        }
    }
}

pub type Result<T, E = SortError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_message_names_step() {
        let err = SortError::execution(
            "round 3 (bitonic_sort_stage_n)",
            SubstrateError::Dispatch("device lost".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "execution failed at round 3 (bitonic_sort_stage_n): dispatch failed: device lost"
        );
    }

    #[test]
    fn test_execution_error_exposes_source() {
        use std::error::Error as _;
        let err = SortError::execution("read back", SubstrateError::Transfer("short".into()));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("buffer transfer failed: short"));
    }
}
