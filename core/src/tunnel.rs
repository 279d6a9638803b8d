use async_trait::async_trait;
use thiserror::Error;

/// Opaque platform permission-request token. The coordinator forwards it
/// verbatim to the host; only the host knows how to act on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionToken(String);

impl PermissionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum TunnelError {
    /// The OS requires an interactive permission grant before any tunnel
    /// can come up. Not a config health signal.
    #[error("tunnel permission required")]
    PermissionRequired(PermissionToken),

    #[error("tunnel connect failed: {0}")]
    Connect(String),

    #[error("tunnel disconnect failed: {0}")]
    Disconnect(String),
}

/// VPN/tunnel backend collaborator.
#[async_trait]
pub trait Tunnel: Send + Sync {
    async fn connect(&self, config: &str) -> Result<(), TunnelError>;
    async fn disconnect(&self) -> Result<(), TunnelError>;
}
