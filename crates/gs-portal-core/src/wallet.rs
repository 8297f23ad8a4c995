//! Wallet session management.
//!
//! A [`WalletProvider`] is the signer capability (browser extension, local
//! keypair, hardware device). [`WalletSessionManager`] owns the
//! `Disconnected → Connecting → Connected` state for one UI session and is the
//! only writer of the connected [`SignerIdentity`].

use async_trait::async_trait;
use gs_api_types::SignerIdentity;
use gs_chain_client::Signature;
use gs_crypto::{Ed25519Signer, MessageSigner};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::PortalError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet is not available")]
    NotAvailable,
    #[error("wallet has not trusted this site")]
    NotTrusted,
    #[error("request rejected by the wallet")]
    Rejected,
    #[error("wallet cannot sign for {0}")]
    UnknownAccount(String),
}

impl From<WalletError> for PortalError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NotAvailable => PortalError::CapabilityAbsent,
            WalletError::NotTrusted | WalletError::Rejected | WalletError::UnknownAccount(_) => {
                PortalError::UserRejected
            }
        }
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the user approved this site before, making a silent connect possible.
    fn has_prior_trust(&self) -> bool;

    /// With `only_if_trusted` the wallet must not prompt; it fails instead.
    async fn connect(&self, only_if_trusted: bool) -> Result<SignerIdentity, WalletError>;

    async fn sign_message(
        &self,
        identity: &SignerIdentity,
        message: &[u8],
    ) -> Result<Signature, WalletError>;

    async fn disconnect(&self) {}
}

/// Software wallet backed by a keypair file.
///
/// Explicit connects always approve and record trust, so later sessions can
/// reconnect silently.
pub struct KeypairWallet {
    signer: Ed25519Signer,
    trusted: AtomicBool,
}

impl KeypairWallet {
    pub fn new(signer: Ed25519Signer, trusted: bool) -> Self {
        Self {
            signer,
            trusted: AtomicBool::new(trusted),
        }
    }

    pub fn address(&self) -> String {
        self.signer.address()
    }
}

#[async_trait]
impl WalletProvider for KeypairWallet {
    fn name(&self) -> &str {
        "keypair"
    }

    fn has_prior_trust(&self) -> bool {
        self.trusted.load(Ordering::Acquire)
    }

    async fn connect(&self, only_if_trusted: bool) -> Result<SignerIdentity, WalletError> {
        if only_if_trusted && !self.has_prior_trust() {
            return Err(WalletError::NotTrusted);
        }
        self.trusted.store(true, Ordering::Release);
        Ok(SignerIdentity::new(self.signer.address()))
    }

    async fn sign_message(
        &self,
        identity: &SignerIdentity,
        message: &[u8],
    ) -> Result<Signature, WalletError> {
        if identity.public_address != self.signer.address() {
            return Err(WalletError::UnknownAccount(identity.public_address.clone()));
        }
        Ok(Signature::from(self.signer.sign_message(message)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected(SignerIdentity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(SignerIdentity),
    NoSession,
}

/// A connected identity paired with the capability that can sign for it.
#[derive(Clone)]
pub struct SessionSigner {
    pub identity: SignerIdentity,
    provider: Arc<dyn WalletProvider>,
}

impl SessionSigner {
    pub fn new(identity: SignerIdentity, provider: Arc<dyn WalletProvider>) -> Self {
        Self { identity, provider }
    }

    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        self.provider.sign_message(&self.identity, message).await
    }
}

pub struct WalletSessionManager {
    provider: Option<Arc<dyn WalletProvider>>,
    state: RwLock<SessionState>,
    connect_timeout: Duration,
}

impl WalletSessionManager {
    /// `provider` is `None` when no signer capability was discovered.
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, connect_timeout: Duration) -> Self {
        Self {
            provider,
            state: RwLock::new(SessionState::Disconnected),
            connect_timeout,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn identity(&self) -> Option<SignerIdentity> {
        match &*self.state.read().await {
            SessionState::Connected(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    pub async fn signer(&self) -> Result<SessionSigner, PortalError> {
        let provider = self.provider.clone().ok_or(PortalError::CapabilityAbsent)?;
        let identity = self.identity().await.ok_or(PortalError::NotConnected)?;
        Ok(SessionSigner::new(identity, provider))
    }

    /// Reconnects without prompting when the wallet already trusts this site.
    /// Every failure is reported as [`ConnectOutcome::NoSession`].
    pub async fn attempt_silent_connect(&self) -> ConnectOutcome {
        if let Some(identity) = self.identity().await {
            return ConnectOutcome::Connected(identity);
        }
        let Some(provider) = self.provider.clone() else {
            return ConnectOutcome::NoSession;
        };
        if !provider.has_prior_trust() {
            return ConnectOutcome::NoSession;
        }

        match self.run_connect(provider, true).await {
            Ok(identity) => ConnectOutcome::Connected(identity),
            Err(_) => ConnectOutcome::NoSession,
        }
    }

    /// Connects, allowing the wallet to prompt the user.
    pub async fn connect_explicit(&self) -> Result<SignerIdentity, PortalError> {
        if let Some(identity) = self.identity().await {
            return Ok(identity);
        }
        let provider = self.provider.clone().ok_or(PortalError::CapabilityAbsent)?;
        self.run_connect(provider, false).await
    }

    pub async fn disconnect(&self) {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, SessionState::Disconnected)
        };
        if let (SessionState::Connected(_), Some(provider)) = (previous, &self.provider) {
            provider.disconnect().await;
        }
    }

    async fn run_connect(
        &self,
        provider: Arc<dyn WalletProvider>,
        only_if_trusted: bool,
    ) -> Result<SignerIdentity, PortalError> {
        *self.state.write().await = SessionState::Connecting;

        let result = match tokio::time::timeout(self.connect_timeout, provider.connect(only_if_trusted)).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(err)) => Err(PortalError::from(err)),
            Err(_) => Err(PortalError::Timeout {
                operation: "connect",
                after_ms: self.connect_timeout.as_millis() as u64,
            }),
        };

        *self.state.write().await = match &result {
            Ok(identity) => SessionState::Connected(identity.clone()),
            Err(_) => SessionState::Disconnected,
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Scripted wallet: answers every connect with the configured result.
    struct ScriptedWallet {
        trusted: bool,
        outcome: Result<SignerIdentity, WalletError>,
        hang: bool,
        connects: AtomicUsize,
    }

    impl ScriptedWallet {
        fn approving(trusted: bool) -> Self {
            Self {
                trusted,
                outcome: Ok(SignerIdentity::new("wallet-1")),
                hang: false,
                connects: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WalletProvider for ScriptedWallet {
        fn name(&self) -> &str {
            "scripted"
        }

        fn has_prior_trust(&self) -> bool {
            self.trusted
        }

        async fn connect(&self, _only_if_trusted: bool) -> Result<SignerIdentity, WalletError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.outcome.clone()
        }

        async fn sign_message(
            &self,
            _identity: &SignerIdentity,
            _message: &[u8],
        ) -> Result<Signature, WalletError> {
            Err(WalletError::Rejected)
        }
    }

    fn manager(wallet: ScriptedWallet) -> (Arc<ScriptedWallet>, WalletSessionManager) {
        let wallet = Arc::new(wallet);
        let provider: Arc<dyn WalletProvider> = wallet.clone();
        (wallet, WalletSessionManager::new(Some(provider), Duration::from_millis(50)))
    }

    #[tokio::test]
    async fn silent_connect_without_capability_is_no_session() {
        let sessions = WalletSessionManager::new(None, Duration::from_secs(1));
        assert_eq!(sessions.attempt_silent_connect().await, ConnectOutcome::NoSession);
        assert_eq!(sessions.state().await, SessionState::Disconnected);
        assert_eq!(sessions.connect_explicit().await, Err(PortalError::CapabilityAbsent));
    }

    #[tokio::test]
    async fn silent_connect_skips_untrusted_wallet() {
        let (wallet, sessions) = manager(ScriptedWallet::approving(false));
        assert_eq!(sessions.attempt_silent_connect().await, ConnectOutcome::NoSession);
        assert_eq!(wallet.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn silent_connect_with_trust_connects() {
        let (_wallet, sessions) = manager(ScriptedWallet::approving(true));
        assert_eq!(
            sessions.attempt_silent_connect().await,
            ConnectOutcome::Connected(SignerIdentity::new("wallet-1"))
        );
        assert_eq!(
            sessions.state().await,
            SessionState::Connected(SignerIdentity::new("wallet-1"))
        );
    }

    #[tokio::test]
    async fn rejected_explicit_connect_returns_to_disconnected() {
        let (_wallet, sessions) = manager(ScriptedWallet {
            outcome: Err(WalletError::Rejected),
            ..ScriptedWallet::approving(false)
        });
        assert_eq!(sessions.connect_explicit().await, Err(PortalError::UserRejected));
        assert_eq!(sessions.state().await, SessionState::Disconnected);
        assert_eq!(sessions.signer().await.err(), Some(PortalError::NotConnected));
    }

    #[tokio::test]
    async fn hung_wallet_times_out_and_regresses() {
        let (_wallet, sessions) = manager(ScriptedWallet {
            hang: true,
            ..ScriptedWallet::approving(false)
        });
        assert!(matches!(
            sessions.connect_explicit().await,
            Err(PortalError::Timeout { operation: "connect", .. })
        ));
        assert_eq!(sessions.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_clears_identity() {
        let (_wallet, sessions) = manager(ScriptedWallet::approving(true));
        sessions.connect_explicit().await.unwrap();
        assert!(sessions.identity().await.is_some());
        sessions.disconnect().await;
        assert_eq!(sessions.identity().await, None);
    }

    #[tokio::test]
    async fn keypair_wallet_gains_trust_after_explicit_connect() {
        let wallet = KeypairWallet::new(Ed25519Signer::new_random(), false);
        assert_eq!(wallet.connect(true).await, Err(WalletError::NotTrusted));

        let identity = wallet.connect(false).await.unwrap();
        assert_eq!(identity.public_address, wallet.address());
        assert!(wallet.has_prior_trust());
        assert!(wallet.sign_message(&identity, b"msg").await.is_ok());
        assert!(matches!(
            wallet.sign_message(&SignerIdentity::new("someone-else"), b"msg").await,
            Err(WalletError::UnknownAccount(_))
        ));
    }
}
