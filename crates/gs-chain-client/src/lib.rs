use async_trait::async_trait;
use gs_api_types::CommitmentLevel;
use thiserror::Error;

pub use solana_sdk::hash::Hash;
pub use solana_sdk::instruction::{AccountMeta, Instruction};
pub use solana_sdk::message::Message;
pub use solana_sdk::pubkey::Pubkey;
pub use solana_sdk::signature::Signature;
pub use solana_sdk::system_program::ID as SYSTEM_PROGRAM_ID;
pub use solana_sdk::transaction::Transaction;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Request never produced a usable response (connection, HTTP status, body).
    #[error("transport: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The ledger refused the transaction (preflight or execution failure).
    #[error("{message}")]
    Rejected { message: String, logs: Vec<String> },
    #[error("decode: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    pub owner: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxStatus {
    /// `None` while the ledger has seen the transaction but not yet reached any level.
    pub confirmation: Option<CommitmentLevel>,
    pub err: Option<String>,
}

/// Places a signature produced outside `solana-sdk` (wallet, raw keypair) in
/// the slot that belongs to `signer`.
pub fn attach_signature(
    tx: &mut Transaction,
    signer: &Pubkey,
    signature: Signature,
) -> Result<(), ChainError> {
    let required = tx.message.header.num_required_signatures as usize;
    let slot = tx
        .message
        .account_keys
        .iter()
        .take(required)
        .position(|key| key == signer)
        .and_then(|position| tx.signatures.get_mut(position))
        .ok_or_else(|| ChainError::Decode(format!("{signer} is not a required signer")))?;
    *slot = signature;
    Ok(())
}

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    fn endpoint(&self) -> &str;

    /// `Ok(None)` means the ledger answered and the account does not exist.
    async fn get_account(
        &self,
        address: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<Option<AccountData>, ChainError>;

    async fn latest_blockhash(&self, commitment: CommitmentLevel) -> Result<Hash, ChainError>;

    async fn send_transaction(
        &self,
        tx: &Transaction,
        preflight: CommitmentLevel,
    ) -> Result<Signature, ChainError>;

    /// `Ok(None)` means the signature is unknown to the ledger so far.
    async fn signature_status(&self, signature: &Signature) -> Result<Option<TxStatus>, ChainError>;
}
