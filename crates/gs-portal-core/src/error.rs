use thiserror::Error;

/// Every remote-call failure is converted into one of these at the call boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortalError {
    #[error("no signer capability found; install a wallet to continue")]
    CapabilityAbsent,
    #[error("connection request was rejected")]
    UserRejected,
    #[error("target account is already initialized")]
    AlreadyInitialized,
    /// Program-level failure, message passed through unchanged.
    #[error("{0}")]
    RemoteRejected(String),
    #[error("failed to fetch account state: {0}")]
    FetchFailed(String),
    /// Transport or RPC failure while submitting; the ledger never judged the transaction.
    #[error("failed to submit transaction: {0}")]
    SubmitFailed(String),
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },
    #[error("another write is already in flight for this account")]
    OperationInFlight,
    #[error("no wallet session is connected")]
    NotConnected,
    #[error("target account keypair is not loaded; initialization is unavailable")]
    TargetKeyUnavailable,
}

impl PortalError {
    pub fn kind(&self) -> &'static str {
        match self {
            PortalError::CapabilityAbsent => "capability_absent",
            PortalError::UserRejected => "user_rejected",
            PortalError::AlreadyInitialized => "already_initialized",
            PortalError::RemoteRejected(_) => "remote_rejected",
            PortalError::FetchFailed(_) => "fetch_failed",
            PortalError::SubmitFailed(_) => "submit_failed",
            PortalError::Timeout { .. } => "timeout",
            PortalError::OperationInFlight => "operation_in_flight",
            PortalError::NotConnected => "not_connected",
            PortalError::TargetKeyUnavailable => "target_key_unavailable",
        }
    }
}
