use kube::Error as KubeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] KubeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid namespace mapping: {0}")]
    InvalidMapping(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("Conflict updating {kind} {name}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Webhook error: {0}")]
    Webhook(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn not_found(kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Error::NotFound {
            kind: kind.into(),
            namespace: namespace.unwrap_or("").into(),
            name: name.into(),
        }
    }

    /// Errors worth another attempt on the next tick or requeue.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube(_) | Error::Timeout(_) | Error::Conflict { .. } | Error::NotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_includes_coordinates() {
        let err = Error::not_found("ConfigMap", Some("kube-public"), "common-service-maps");
        assert_eq!(
            err.to_string(),
            "ConfigMap kube-public/common-service-maps not found"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn malformed_input_is_not_transient() {
        assert!(!Error::InvalidManifest("missing kind".into()).is_transient());
        assert!(!Error::Config("OPERATOR_NAMESPACE unset".into()).is_transient());
    }
}
