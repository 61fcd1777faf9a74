use thiserror::Error;

/// Error kinds for the Kubernetes Probe. `Transient` covers
/// anything that should make the Worker's poll loop wait for the next
/// tick instead of failing the store outright.
#[derive(Debug, Error, Clone)]
pub enum ProbeError {
    #[error("transient cluster error: {0}")]
    Transient(String),

    #[error("kubernetes probe error: {0}")]
    Other(String),
}

impl ProbeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Transient(_))
    }

    pub fn from_kube_error(err: kube::Error) -> ProbeError {
        match &err {
            kube::Error::Api(api_err) if api_err.code >= 500 => ProbeError::Transient(api_err.message.clone()),
            kube::Error::Api(api_err) => ProbeError::Other(api_err.message.clone()),
            // connection-level failures (DNS, TLS, timeouts, api server
            // unreachable) surface as Service errors: treat as transient,
            // never as a store-level failure.
            kube::Error::Service(_) => ProbeError::Transient(err.to_string()),
            _ => ProbeError::Transient(err.to_string()),
        }
    }
}
