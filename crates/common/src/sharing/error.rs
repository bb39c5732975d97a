/// Why a secret request did not resolve with a secret
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SharingError {
    /// Cancelled locally; carries the reason given to `cancel`
    #[error("{0}")]
    Cancelled(String),
    #[error("failed to send secret request: {0}")]
    Transport(String),
    /// The sharing engine was dropped with the request still pending
    #[error("secret request dropped before it was resolved")]
    Dropped,
}
