use thiserror::Error;

use crate::RunStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create remote conversation for {local_id}: {cause:#}")]
    RemoteCreate {
        local_id: String,
        cause: anyhow::Error,
    },

    #[error("no conversation registered for {0}; create it before asking")]
    UnknownConversation(String),

    #[error("failed to upload document {name}: {cause:#}")]
    Upload { name: String, cause: anyhow::Error },

    #[error("run on conversation {conversation} ended as {status}")]
    RunIncomplete {
        conversation: String,
        status: RunStatus,
        /// Raw run payload as returned by the service
        raw: String,
    },

    #[error("failed to resolve name of document {source_id}: {cause:#}")]
    NameResolution {
        source_id: String,
        cause: anyhow::Error,
    },

    #[error("{operation} failed for {target}: {cause:#}")]
    Remote {
        operation: &'static str,
        target: String,
        cause: anyhow::Error,
    },

    #[error("{operation} timed out for {target}")]
    Timeout {
        operation: &'static str,
        target: String,
    },

    #[error("conversation store error: {0:#}")]
    Store(anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn remote(operation: &'static str, target: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Remote {
            operation,
            target: target.into(),
            cause,
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_names_operation_and_target() {
        let err = Error::remote("post_message", "thread_1", anyhow::anyhow!("502 Bad Gateway"));
        assert_eq!(
            err.to_string(),
            "post_message failed for thread_1: 502 Bad Gateway"
        );
    }

    #[test]
    fn io_errors_pass_through_unchanged() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from(io);
        assert_eq!(err.to_string(), "denied");
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::PermissionDenied));
    }
}
