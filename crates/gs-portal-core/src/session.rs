use gs_api_types::{SessionView, UiMode};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PortalError;
use crate::program::ProgramClient;
use crate::store::{AccountStore, AccountView, InitializeOutcome};
use crate::ui;
use crate::wallet::{ConnectOutcome, WalletProvider, WalletSessionManager};

/// One UI session: its wallet connection and its view of the target account.
///
/// Created when a front end opens, closed when it goes away. Nothing here is
/// shared between sessions except the program client.
pub struct PortalSession {
    id: Uuid,
    wallet: WalletSessionManager,
    store: AccountStore,
}

impl PortalSession {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, client: Arc<ProgramClient>) -> Self {
        let connect_timeout = client.timeouts().call;
        Self {
            id: Uuid::new_v4(),
            wallet: WalletSessionManager::new(provider, connect_timeout),
            store: AccountStore::new(client),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn wallet(&self) -> &WalletSessionManager {
        &self.wallet
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    /// Page-load path: reconnect silently and, if that works, read the account.
    pub async fn start(&self) -> UiMode {
        if let ConnectOutcome::Connected(_) = self.wallet.attempt_silent_connect().await {
            self.store.refresh().await;
        }
        self.mode().await
    }

    pub async fn connect(&self) -> Result<UiMode, PortalError> {
        self.wallet.connect_explicit().await?;
        self.store.refresh().await;
        Ok(self.mode().await)
    }

    pub async fn initialize(&self) -> Result<(InitializeOutcome, UiMode), PortalError> {
        let signer = self.wallet.signer().await?;
        let (outcome, _) = self.store.initialize(&signer).await?;
        Ok((outcome, self.mode().await))
    }

    pub async fn submit_entry(&self, link: &str) -> Result<UiMode, PortalError> {
        let signer = self.wallet.signer().await?;
        self.store.submit_entry(&signer, link).await?;
        Ok(self.mode().await)
    }

    /// Manual retry path. Without a connected wallet there is nothing to show.
    pub async fn refresh(&self) -> UiMode {
        if self.wallet.identity().await.is_some() {
            self.store.refresh().await;
        }
        self.mode().await
    }

    pub async fn account(&self) -> AccountView {
        self.store.snapshot().await
    }

    pub async fn mode(&self) -> UiMode {
        let identity = self.wallet.identity().await;
        ui::ui_mode(identity.as_ref(), &self.store.snapshot().await)
    }

    pub async fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id,
            signer: self.wallet.identity().await,
            mode: self.mode().await,
        }
    }

    pub async fn close(&self) {
        self.wallet.disconnect().await;
        self.store.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;
    use crate::program::{TargetAccount, Timeouts};
    use crate::wallet::KeypairWallet;
    use async_trait::async_trait;
    use gs_api_types::{CommitmentLevel, ConnectionDescriptor, Entry};
    use gs_chain_client::{AccountData, ChainError, Hash, LedgerRpc, Pubkey, Signature, Transaction, TxStatus};
    use gs_crypto::Ed25519Signer;
    use std::time::Duration;
    use tokio::sync::Notify;

    const PROGRAM: Pubkey = Pubkey::new_from_array([42; 32]);

    fn connection() -> ConnectionDescriptor {
        ConnectionDescriptor {
            endpoint_url: "memory://".to_owned(),
            commitment: CommitmentLevel::Confirmed,
        }
    }

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            call: Duration::from_millis(200),
            confirm: Duration::from_millis(500),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn client_over(rpc: Arc<dyn LedgerRpc>, target: TargetAccount) -> Arc<ProgramClient> {
        Arc::new(ProgramClient::new(rpc, connection(), PROGRAM, target, fast_timeouts()))
    }

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        client: Arc<ProgramClient>,
    }

    impl Fixture {
        fn new() -> Self {
            let ledger = Arc::new(InMemoryLedger::new(PROGRAM));
            let client = client_over(ledger.clone(), TargetAccount::from_keypair(Ed25519Signer::new_random()));
            Self { ledger, client }
        }

        fn session(&self, wallet: &Arc<KeypairWallet>) -> PortalSession {
            let provider: Arc<dyn WalletProvider> = wallet.clone();
            PortalSession::new(Some(provider), self.client.clone())
        }
    }

    fn wallet(trusted: bool) -> Arc<KeypairWallet> {
        Arc::new(KeypairWallet::new(Ed25519Signer::new_random(), trusted))
    }

    fn links(mode: &UiMode) -> Vec<String> {
        match mode {
            UiMode::Ready { entries } => entries.iter().map(|e| e.link.clone()).collect(),
            other => panic!("expected ready mode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn untrusted_wallet_starts_disconnected_then_needs_initialization() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(false));

        assert_eq!(session.start().await, UiMode::Disconnected);
        assert_eq!(fixture.ledger.read_count(), 0);

        assert_eq!(session.connect().await?, UiMode::NeedsInitialization);
        Ok(())
    }

    #[tokio::test]
    async fn trusted_wallet_reconnects_silently_and_loads() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(true));
        assert_eq!(session.start().await, UiMode::NeedsInitialization);
        Ok(())
    }

    #[tokio::test]
    async fn initialize_twice_is_created_then_already_initialized() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(true));
        session.start().await;

        let (first, mode) = session.initialize().await?;
        assert_eq!(first, InitializeOutcome::Created);
        assert_eq!(mode, UiMode::Ready { entries: vec![] });
        assert_eq!(session.account().await, AccountView::Initialized(vec![]));

        let (second, mode) = session.initialize().await?;
        assert_eq!(second, InitializeOutcome::AlreadyInitialized);
        assert_eq!(mode, UiMode::Ready { entries: vec![] });

        let direct = fixture.client.initialize_account(&session.wallet().signer().await?).await;
        assert_eq!(direct, Err(PortalError::AlreadyInitialized));
        Ok(())
    }

    #[tokio::test]
    async fn submitted_entry_appears_last_with_submitter() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let alice = wallet(true);
        let bob = wallet(true);
        let alice_session = fixture.session(&alice);
        let bob_session = fixture.session(&bob);
        alice_session.start().await;
        bob_session.start().await;
        alice_session.initialize().await?;

        alice_session.submit_entry("https://media/one.gif").await?;
        bob_session.submit_entry("https://media/two.gif").await?;
        let mode = alice_session.submit_entry("https://media/three.gif").await?;

        assert_eq!(
            links(&mode),
            vec!["https://media/one.gif", "https://media/two.gif", "https://media/three.gif"]
        );

        let AccountView::Initialized(entries) = alice_session.account().await else {
            panic!("account should be initialized");
        };
        assert_eq!(
            entries.last(),
            Some(&Entry {
                link: "https://media/three.gif".to_owned(),
                submitter_address: alice.address(),
            })
        );
        assert_eq!(entries[1].submitter_address, bob.address());
        Ok(())
    }

    #[tokio::test]
    async fn repeated_refresh_is_stable() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(true));
        session.start().await;
        session.initialize().await?;
        session.submit_entry("a.gif").await?;

        let first = session.refresh().await;
        let second = session.refresh().await;
        let third = session.store().refresh().await;
        assert_eq!(first, second);
        assert_eq!(third, AccountView::Initialized(vec![Entry {
            link: "a.gif".to_owned(),
            submitter_address: session.wallet().identity().await.unwrap().public_address,
        }]));
        Ok(())
    }

    #[tokio::test]
    async fn empty_link_is_a_no_op() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(true));
        session.start().await;
        session.initialize().await?;
        let before = session.account().await;
        let sends = fixture.ledger.send_count();
        let reads = fixture.ledger.read_count();

        session.submit_entry("").await?;
        assert_eq!(
            fixture
                .client
                .submit_entry(&session.wallet().signer().await?, "")
                .await?,
            None
        );

        assert_eq!(fixture.ledger.send_count(), sends);
        assert_eq!(fixture.ledger.read_count(), reads);
        assert_eq!(session.account().await, before);
        Ok(())
    }

    #[tokio::test]
    async fn links_are_stored_byte_for_byte() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let alice = wallet(true);
        let session = fixture.session(&alice);
        session.start().await;
        session.initialize().await?;

        // no `.gif` suffix once the trailing space is kept, so nothing is displayed
        let mode = session.submit_entry(" https://m/x.gif ").await?;
        assert_eq!(links(&mode), Vec::<String>::new());
        session.submit_entry("   ").await?;

        assert_eq!(fixture.ledger.send_count(), 3);
        assert_eq!(
            session.account().await,
            AccountView::Initialized(vec![
                Entry {
                    link: " https://m/x.gif ".to_owned(),
                    submitter_address: alice.address(),
                },
                Entry {
                    link: "   ".to_owned(),
                    submitter_address: alice.address(),
                },
            ])
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_account_and_network_failure_stay_distinct() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(true));

        assert_eq!(session.start().await, UiMode::NeedsInitialization);
        assert_eq!(
            fixture.client.fetch_account_state().await,
            Ok(crate::program::AccountState::Uninitialized)
        );

        fixture.ledger.set_offline(true);
        assert!(matches!(
            fixture.client.fetch_account_state().await,
            Err(PortalError::FetchFailed(_))
        ));
        assert!(matches!(session.refresh().await, UiMode::Error { .. }));

        fixture.ledger.set_offline(false);
        assert_eq!(session.refresh().await, UiMode::NeedsInitialization);
        Ok(())
    }

    #[tokio::test]
    async fn foreign_account_is_a_fetch_failure() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let target = *fixture.client.target().address();
        fixture
            .ledger
            .put_account(target, gs_chain_client::SYSTEM_PROGRAM_ID, vec![0; 16])
            .await;
        assert!(matches!(
            fixture.client.fetch_account_state().await,
            Err(PortalError::FetchFailed(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn remote_rejection_is_surfaced_verbatim() -> anyhow::Result<()> {
        let ledger = Arc::new(InMemoryLedger::with_space(PROGRAM, 120));
        let client = client_over(ledger.clone(), TargetAccount::from_keypair(Ed25519Signer::new_random()));
        let session = PortalSession::new(Some(wallet(true) as Arc<dyn WalletProvider>), client);
        session.start().await;
        session.initialize().await?;

        session.submit_entry("short.gif").await?;
        let err = session
            .submit_entry(&format!("{}.gif", "x".repeat(80)))
            .await
            .unwrap_err();
        match err {
            PortalError::RemoteRejected(message) => {
                assert_eq!(
                    message,
                    "Transaction simulation failed: Error processing Instruction 0: custom program error: 0xbbc"
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(links(&session.mode().await), vec!["short.gif"]);
        Ok(())
    }

    #[tokio::test]
    async fn initialize_requires_target_keypair() -> anyhow::Result<()> {
        let ledger = Arc::new(InMemoryLedger::new(PROGRAM));
        let client = client_over(ledger, TargetAccount::address_only(Pubkey::new_from_array([7; 32])));
        let session = PortalSession::new(Some(wallet(true) as Arc<dyn WalletProvider>), client);
        session.start().await;
        assert_eq!(session.initialize().await.err(), Some(PortalError::TargetKeyUnavailable));
        Ok(())
    }

    #[tokio::test]
    async fn writes_require_a_connected_wallet() {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(false));
        session.start().await;
        assert_eq!(session.submit_entry("a.gif").await, Err(PortalError::NotConnected));
        assert_eq!(session.initialize().await.err(), Some(PortalError::NotConnected));
    }

    #[tokio::test]
    async fn stalled_ledger_times_out() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(true));
        session.start().await;
        session.initialize().await?;

        fixture.ledger.set_stalled(true);
        assert!(matches!(
            session.submit_entry("late.gif").await,
            Err(PortalError::Timeout { .. })
        ));
        assert!(matches!(session.refresh().await, UiMode::Error { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn close_tears_down_the_session() -> anyhow::Result<()> {
        let fixture = Fixture::new();
        let session = fixture.session(&wallet(true));
        session.start().await;
        session.close().await;
        assert_eq!(session.mode().await, UiMode::Disconnected);
        assert_eq!(session.account().await, AccountView::NotLoaded);
        Ok(())
    }

    /// Holds `send_transaction` until released, to observe in-flight behaviour.
    struct GatedLedger {
        inner: Arc<InMemoryLedger>,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl LedgerRpc for GatedLedger {
        fn endpoint(&self) -> &str {
            self.inner.endpoint()
        }

        async fn get_account(
            &self,
            address: &Pubkey,
            commitment: CommitmentLevel,
        ) -> Result<Option<AccountData>, ChainError> {
            self.inner.get_account(address, commitment).await
        }

        async fn latest_blockhash(&self, commitment: CommitmentLevel) -> Result<Hash, ChainError> {
            self.inner.latest_blockhash(commitment).await
        }

        async fn send_transaction(
            &self,
            tx: &Transaction,
            preflight: CommitmentLevel,
        ) -> Result<Signature, ChainError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.send_transaction(tx, preflight).await
        }

        async fn signature_status(&self, signature: &Signature) -> Result<Option<TxStatus>, ChainError> {
            self.inner.signature_status(signature).await
        }
    }

    #[tokio::test]
    async fn overlapping_writes_are_guarded_and_refresh_waits() -> anyhow::Result<()> {
        let inner = Arc::new(InMemoryLedger::new(PROGRAM));
        let target = Ed25519Signer::new_random();
        let target_address = Pubkey::new_from_array(gs_crypto::MessageSigner::public_key_bytes(&target));
        inner
            .put_account(
                target_address,
                PROGRAM,
                crate::program::codec::encode_base_account(&Default::default(), 512).unwrap(),
            )
            .await;

        let gated = Arc::new(GatedLedger {
            inner: inner.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let client = client_over(gated.clone(), TargetAccount::from_keypair(target));
        let session = Arc::new(PortalSession::new(
            Some(wallet(true) as Arc<dyn WalletProvider>),
            client,
        ));
        session.start().await;

        let writer = {
            let session = session.clone();
            tokio::spawn(async move { session.submit_entry("first.gif").await })
        };
        gated.entered.notified().await;

        assert_eq!(
            session.submit_entry("second.gif").await,
            Err(PortalError::OperationInFlight)
        );

        let reader = {
            let session = session.clone();
            tokio::spawn(async move { session.store().refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        gated.release.notify_one();
        let written = writer.await??;
        assert_eq!(links(&written), vec!["first.gif"]);

        let refreshed = reader.await?;
        assert!(matches!(refreshed, AccountView::Initialized(ref entries) if entries.len() == 1));
        assert_eq!(inner.send_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn writes_from_another_session_wait_for_the_target() -> anyhow::Result<()> {
        let inner = Arc::new(InMemoryLedger::new(PROGRAM));
        let target = Ed25519Signer::new_random();
        let target_address = Pubkey::new_from_array(gs_crypto::MessageSigner::public_key_bytes(&target));
        inner
            .put_account(
                target_address,
                PROGRAM,
                crate::program::codec::encode_base_account(&Default::default(), 512).unwrap(),
            )
            .await;

        let gated = Arc::new(GatedLedger {
            inner: inner.clone(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let client = client_over(gated.clone(), TargetAccount::from_keypair(target));
        let first = Arc::new(PortalSession::new(
            Some(wallet(true) as Arc<dyn WalletProvider>),
            client.clone(),
        ));
        let second = PortalSession::new(Some(wallet(true) as Arc<dyn WalletProvider>), client);
        first.start().await;
        second.start().await;

        let writer = {
            let first = first.clone();
            tokio::spawn(async move { first.submit_entry("first.gif").await })
        };
        gated.entered.notified().await;

        assert_eq!(
            second.submit_entry("second.gif").await,
            Err(PortalError::OperationInFlight)
        );
        assert_eq!(second.initialize().await.err(), Some(PortalError::OperationInFlight));

        gated.release.notify_one();
        assert_eq!(links(&writer.await??), vec!["first.gif"]);

        // the target is free again once the first write settles
        let gated_send = {
            let gated = gated.clone();
            tokio::spawn(async move {
                gated.entered.notified().await;
                gated.release.notify_one();
            })
        };
        assert_eq!(
            links(&second.submit_entry("second.gif").await?),
            vec!["first.gif", "second.gif"]
        );
        gated_send.await?;
        assert_eq!(inner.send_count(), 2);
        Ok(())
    }
}
