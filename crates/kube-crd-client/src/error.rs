//! Client error types

use std::time::Duration;

/// Result alias used throughout the client crate
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    #[error("conflict on {kind} {name:?}: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("watch expired: {0}")]
    Expired(String),

    #[error("CRD {name} not established within {timeout:?}")]
    RegistrationTimeout { name: String, timeout: Duration },

    #[error("CRD registration failed: {0}")]
    Registration(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("watch failed: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }

    /// Map an API server failure onto the request it was made for.
    ///
    /// Status codes follow the apiserver conventions: 409 is either
    /// `AlreadyExists` or an optimistic-concurrency `Conflict` depending on
    /// the reason, 404 is `NotFound`, 422 is a validation failure.
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(resp) => match (resp.code, resp.reason.as_str()) {
                (409, "AlreadyExists") => ClientError::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                },
                (409, _) => ClientError::Conflict {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    message: resp.message,
                },
                (404, _) => ClientError::NotFound {
                    kind: kind.to_string(),
                    name: name.to_string(),
                },
                (422, _) => ClientError::Invalid(resp.message),
                (410, _) => ClientError::Expired(resp.message),
                _ => ClientError::Kube(kube::Error::Api(resp)),
            },
            other => ClientError::Kube(other),
        }
    }
}
