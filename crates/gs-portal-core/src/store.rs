use gs_api_types::Entry;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::PortalError;
use crate::program::{AccountState, ProgramClient};
use crate::wallet::SessionSigner;

/// Last-known remote state of the target account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountView {
    /// No read has completed yet.
    NotLoaded,
    Uninitialized,
    Initialized(Vec<Entry>),
    FetchFailed(String),
}

impl From<Result<AccountState, PortalError>> for AccountView {
    fn from(result: Result<AccountState, PortalError>) -> Self {
        match result {
            Ok(AccountState::Uninitialized) => AccountView::Uninitialized,
            Ok(AccountState::Initialized(entries)) => AccountView::Initialized(entries),
            Err(err) => AccountView::FetchFailed(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeOutcome {
    Created,
    AlreadyInitialized,
}

/// Caches the target account for one session.
///
/// Every update is a full overwrite from a fresh read. Writes hold the
/// session's guard through their follow-up refresh, so a refresh never runs
/// concurrently with a submission and never observes the cache mid-update.
/// Overlapping writes from different sessions are refused by the
/// [`ProgramClient`] write guard, which is shared per target account.
pub struct AccountStore {
    client: Arc<ProgramClient>,
    cache: RwLock<AccountView>,
    in_flight: Mutex<()>,
}

impl AccountStore {
    pub fn new(client: Arc<ProgramClient>) -> Self {
        Self {
            client,
            cache: RwLock::new(AccountView::NotLoaded),
            in_flight: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> AccountView {
        self.cache.read().await.clone()
    }

    /// Re-fetches and replaces the cache. Queues behind an in-flight write.
    pub async fn refresh(&self) -> AccountView {
        let _guard = self.in_flight.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> AccountView {
        let view = AccountView::from(self.client.fetch_account_state().await);
        if let AccountView::FetchFailed(reason) = &view {
            debug!(account = %self.client.target().address(), %reason, "account refresh failed");
        }
        *self.cache.write().await = view.clone();
        view
    }

    /// Submits `link`, then re-reads once the submission is confirmed.
    ///
    /// An empty link leaves the cache untouched and makes no remote call.
    pub async fn submit_entry(&self, signer: &SessionSigner, link: &str) -> Result<AccountView, PortalError> {
        if link.is_empty() {
            return Ok(self.snapshot().await);
        }
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| PortalError::OperationInFlight)?;

        self.client.submit_entry(signer, link).await?;
        Ok(self.refresh_locked().await)
    }

    /// Creates the target account. An existing account is reported as
    /// [`InitializeOutcome::AlreadyInitialized`]; either way the cache is refreshed.
    pub async fn initialize(
        &self,
        signer: &SessionSigner,
    ) -> Result<(InitializeOutcome, AccountView), PortalError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| PortalError::OperationInFlight)?;

        let outcome = match self.client.initialize_account(signer).await {
            Ok(_) => InitializeOutcome::Created,
            Err(PortalError::AlreadyInitialized) => InitializeOutcome::AlreadyInitialized,
            Err(err) => return Err(err),
        };
        Ok((outcome, self.refresh_locked().await))
    }

    /// Drops cached state, e.g. when the wallet session ends.
    pub async fn clear(&self) {
        let _guard = self.in_flight.lock().await;
        *self.cache.write().await = AccountView::NotLoaded;
    }
}
