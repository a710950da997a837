//! Error types for the roaming adapter

use thiserror::Error;

/// Error type returned by flush executors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors in adapter construction and lifecycle
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Flush scheduler already started")]
    AlreadyStarted,

    #[error("Adapter has been shut down")]
    Shutdown,
}

/// Follow the `source()` chain down to the innermost error
pub fn root_cause<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> &'a (dyn std::error::Error + 'static) {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("push failed")]
    struct PushFailed(#[source] std::io::Error);

    #[test]
    fn test_root_cause_unwraps_chain() {
        let err: BoxError = Box::new(PushFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by partner",
        )));

        assert_eq!(root_cause(err.as_ref()).to_string(), "connection reset by partner");
    }

    #[test]
    fn test_root_cause_of_leaf_is_itself() {
        let err = AdapterError::AlreadyStarted;
        assert_eq!(root_cause(&err).to_string(), "Flush scheduler already started");
    }
}
