//! Program client for the stash program's single target account.

pub mod codec;

use gs_api_types::{CommitmentLevel, ConnectionDescriptor, Entry};
use gs_chain_client::{
    AccountMeta, ChainError, Instruction, LedgerRpc, Message, Pubkey, SYSTEM_PROGRAM_ID, Signature,
    Transaction, attach_signature,
};
use gs_crypto::{Ed25519Signer, MessageSigner};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PortalError;
use crate::wallet::SessionSigner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on any single remote call.
    pub call: Duration,
    /// Bound on waiting for a submitted transaction to reach the commitment level.
    pub confirm: Duration,
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            call: Duration::from_secs(30),
            confirm: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// The one account every user of this client reads and appends to.
pub struct TargetAccount {
    address: Pubkey,
    keypair: Option<Ed25519Signer>,
}

impl TargetAccount {
    /// Address derived from the provisioned keypair; required for initialization.
    pub fn from_keypair(keypair: Ed25519Signer) -> Self {
        Self {
            address: Pubkey::new_from_array(keypair.public_key_bytes()),
            keypair: Some(keypair),
        }
    }

    /// Read and append only.
    pub fn address_only(address: Pubkey) -> Self {
        Self {
            address,
            keypair: None,
        }
    }

    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    pub fn can_initialize(&self) -> bool {
        self.keypair.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    Uninitialized,
    Initialized(Vec<Entry>),
}

pub struct ProgramClient {
    rpc: Arc<dyn LedgerRpc>,
    connection: ConnectionDescriptor,
    program_id: Pubkey,
    target: TargetAccount,
    timeouts: Timeouts,
    /// Held for the duration of a write against the target account.
    write_guard: Mutex<()>,
}

impl ProgramClient {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        connection: ConnectionDescriptor,
        program_id: Pubkey,
        target: TargetAccount,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            rpc,
            connection,
            program_id,
            target,
            timeouts,
            write_guard: Mutex::new(()),
        }
    }

    pub fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn target(&self) -> &TargetAccount {
        &self.target
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn commitment(&self) -> CommitmentLevel {
        self.connection.commitment
    }

    /// Creates the target account, funded by `signer`.
    ///
    /// An existing account yields [`PortalError::AlreadyInitialized`], never success.
    pub async fn initialize_account(&self, signer: &SessionSigner) -> Result<Signature, PortalError> {
        let _write = self.begin_write()?;
        let target_keypair = self
            .target
            .keypair
            .as_ref()
            .ok_or(PortalError::TargetKeyUnavailable)?;
        let user = parse_signer(signer)?;

        let ix = Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(self.target.address, true),
                AccountMeta::new(user, true),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            ],
            data: codec::encode_initialize(),
        };

        self.sign_and_submit("initialize", ix, signer, user, Some(target_keypair))
            .await
            .map_err(|err| match err {
                SubmitError::Chain(chain) if is_already_in_use(&chain) => PortalError::AlreadyInitialized,
                other => other.into_portal(),
            })
    }

    /// Appends `link` to the target account.
    ///
    /// The link is sent byte for byte. An empty link returns `Ok(None)`
    /// without touching the network.
    pub async fn submit_entry(
        &self,
        signer: &SessionSigner,
        link: &str,
    ) -> Result<Option<Signature>, PortalError> {
        if link.is_empty() {
            return Ok(None);
        }
        let _write = self.begin_write()?;
        let user = parse_signer(signer)?;
        let data = codec::encode_append(link).map_err(|err| PortalError::SubmitFailed(err.to_string()))?;

        let ix = Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(self.target.address, false),
                AccountMeta::new(user, true),
            ],
            data,
        };

        self.sign_and_submit("append", ix, signer, user, None)
            .await
            .map(Some)
            .map_err(SubmitError::into_portal)
    }

    /// Reads the target account.
    ///
    /// `Uninitialized` only when the ledger reports the account does not exist;
    /// every other failure is `FetchFailed`.
    pub async fn fetch_account_state(&self) -> Result<AccountState, PortalError> {
        let account = self
            .bounded("fetch", self.rpc.get_account(&self.target.address, self.commitment()))
            .await
            .map_err(|err| match err {
                PortalError::Timeout { .. } => PortalError::FetchFailed(err.to_string()),
                other => other,
            })?
            .map_err(|err| PortalError::FetchFailed(err.to_string()))?;

        let Some(account) = account else {
            return Ok(AccountState::Uninitialized);
        };

        if account.owner != self.program_id {
            return Err(PortalError::FetchFailed(format!(
                "account {} is owned by {}, expected {}",
                self.target.address, account.owner, self.program_id
            )));
        }

        codec::decode_entries(&account.data)
            .map(AccountState::Initialized)
            .map_err(|err| PortalError::FetchFailed(err.to_string()))
    }

    /// Fails fast while another write against the target is in flight.
    fn begin_write(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, PortalError> {
        self.write_guard
            .try_lock()
            .map_err(|_| PortalError::OperationInFlight)
    }

    async fn sign_and_submit(
        &self,
        operation: &'static str,
        ix: Instruction,
        signer: &SessionSigner,
        payer: Pubkey,
        co_signer: Option<&Ed25519Signer>,
    ) -> Result<Signature, SubmitError> {
        let blockhash = self
            .bounded(operation, self.rpc.latest_blockhash(self.commitment()))
            .await??;

        let mut tx = Transaction::new_unsigned(Message::new_with_blockhash(&[ix], Some(&payer), &blockhash));
        let message = tx.message_data();

        if let Some(keypair) = co_signer {
            let signature = Signature::from(keypair.sign_message(&message));
            attach_signature(&mut tx, &Pubkey::new_from_array(keypair.public_key_bytes()), signature)?;
        }

        let signature = self
            .bounded(operation, signer.sign_message(&message))
            .await?
            .map_err(|err| SubmitError::Portal(err.into()))?;
        attach_signature(&mut tx, &payer, signature)?;

        let sent = self
            .bounded(operation, self.rpc.send_transaction(&tx, self.commitment()))
            .await??;

        debug!(operation, signature = %sent, "transaction sent, awaiting confirmation");
        self.confirm(operation, &sent).await?;
        debug!(operation, signature = %sent, commitment = %self.commitment(), "transaction confirmed");
        Ok(sent)
    }

    /// Polls until the transaction reaches the configured commitment, fails, or the deadline passes.
    async fn confirm(&self, operation: &'static str, signature: &Signature) -> Result<(), SubmitError> {
        let required = self.commitment();
        let poll = async {
            loop {
                match self.bounded(operation, self.rpc.signature_status(signature)).await {
                    Ok(Ok(Some(status))) => {
                        if let Some(err) = status.err {
                            return Err(SubmitError::Chain(ChainError::Rejected {
                                message: format!("transaction {signature} failed: {err}"),
                                logs: Vec::new(),
                            }));
                        }
                        if status
                            .confirmation
                            .is_some_and(|reached| required.is_satisfied_by(reached))
                        {
                            return Ok(());
                        }
                    }
                    // unknown yet, or a transient lookup failure; keep polling until the deadline
                    Ok(Ok(None)) | Ok(Err(_)) | Err(_) => {}
                }
                tokio::time::sleep(self.timeouts.poll_interval).await;
            }
        };

        tokio::time::timeout(self.timeouts.confirm, poll)
            .await
            .map_err(|_| {
                SubmitError::Portal(PortalError::Timeout {
                    operation: "confirm",
                    after_ms: self.timeouts.confirm.as_millis() as u64,
                })
            })?
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = T>,
    ) -> Result<T, PortalError> {
        tokio::time::timeout(self.timeouts.call, fut)
            .await
            .map_err(|_| PortalError::Timeout {
                operation,
                after_ms: self.timeouts.call.as_millis() as u64,
            })
    }
}

/// Submit failures before classification; keeps the raw chain error visible
/// so callers can recognise specific program outcomes.
#[derive(Debug)]
enum SubmitError {
    Chain(ChainError),
    Portal(PortalError),
}

impl SubmitError {
    fn into_portal(self) -> PortalError {
        match self {
            SubmitError::Chain(ChainError::Rejected { message, .. }) => PortalError::RemoteRejected(message),
            SubmitError::Chain(other) => PortalError::SubmitFailed(other.to_string()),
            SubmitError::Portal(err) => err,
        }
    }
}

impl From<ChainError> for SubmitError {
    fn from(err: ChainError) -> Self {
        SubmitError::Chain(err)
    }
}

impl From<PortalError> for SubmitError {
    fn from(err: PortalError) -> Self {
        SubmitError::Portal(err)
    }
}

fn parse_signer(signer: &SessionSigner) -> Result<Pubkey, PortalError> {
    signer
        .identity
        .public_address
        .parse::<Pubkey>()
        .map_err(|err| PortalError::SubmitFailed(format!("invalid signer address: {err}")))
}

/// The system program refuses to allocate over an existing account.
fn is_already_in_use(err: &ChainError) -> bool {
    match err {
        ChainError::Rejected { message, logs } => {
            message.contains("already in use") || logs.iter().any(|line| line.contains("already in use"))
        }
        _ => false,
    }
}
