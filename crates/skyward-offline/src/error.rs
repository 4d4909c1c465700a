use skyward_core::{DatabaseError, NetworkError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OfflineError {
    /// Network failed and the resource is not one we fall back for.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Offline with nothing cached for the request.
    #[error("Offline and no cached copy of {request_key}")]
    NoData { request_key: String },

    #[error("Offline storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Control channel closed")]
    ControlClosed,
}

impl OfflineError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(e) => e.user_message(),
            Self::NoData { .. } => "You are offline and this data has not been cached yet",
            Self::Storage(e) => e.user_message(),
            Self::ControlClosed => "Offline cache is not running",
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::NoData { .. }) || matches!(self, Self::Network(e) if e.is_unreachable())
    }
}
