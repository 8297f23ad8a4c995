//! In-process ledger running the stash program.
//!
//! Backs the offline service mode and the test suites. Transactions are
//! signature-checked and executed atomically; confirmed status is reported
//! as `finalized` immediately.

use async_trait::async_trait;
use gs_api_types::CommitmentLevel;
use gs_chain_client::{
    AccountData, ChainError, Hash, LedgerRpc, Pubkey, Signature, Transaction, TxStatus,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::program::codec::{self, BaseAccount, Decoded, ItemStruct};

const RENT_LAMPORTS: u64 = 63_530_880;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Pubkey, AccountData>,
    statuses: HashMap<Signature, TxStatus>,
    slot: u64,
}

pub struct InMemoryLedger {
    program_id: Pubkey,
    space: usize,
    state: RwLock<LedgerState>,
    offline: AtomicBool,
    stalled: AtomicBool,
    sends: AtomicUsize,
    reads: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new(program_id: Pubkey) -> Self {
        Self::with_space(program_id, codec::ACCOUNT_SPACE)
    }

    /// `space` bounds the encoded account size, so it also bounds how many entries fit.
    pub fn with_space(program_id: Pubkey, space: usize) -> Self {
        Self {
            program_id,
            space,
            state: RwLock::new(LedgerState::default()),
            offline: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
            sends: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a transport error while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every call hangs forever while set.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Stores raw account data owned by `owner`, bypassing the program.
    pub async fn put_account(&self, address: Pubkey, owner: Pubkey, data: Vec<u8>) {
        let mut state = self.state.write().await;
        state.accounts.insert(
            address,
            AccountData {
                owner,
                lamports: RENT_LAMPORTS,
                data,
            },
        );
    }

    async fn gate(&self) -> Result<(), ChainError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChainError::Transport("connection refused".to_owned()));
        }
        Ok(())
    }

    fn verify_signatures(tx: &Transaction) -> Result<(), ChainError> {
        if tx.signatures.len() != tx.message.header.num_required_signatures as usize {
            return Err(rejected("Transaction signature count mismatch", Vec::new()));
        }
        tx.verify()
            .map_err(|_| rejected("Transaction signature verification failure", Vec::new()))
    }

    /// Runs every instruction against a scratch copy; commits only if all succeed.
    fn execute(&self, state: &mut LedgerState, tx: &Transaction) -> Result<(), ChainError> {
        let message = &tx.message;
        let mut accounts = state.accounts.clone();

        for (index, ix) in message.instructions.iter().enumerate() {
            let key_at = |position: usize| -> Result<(usize, Pubkey), ChainError> {
                let key_index = ix
                    .accounts
                    .get(position)
                    .map(|idx| *idx as usize)
                    .ok_or_else(|| instruction_error(index, "NotEnoughAccountKeys", Vec::new()))?;
                message
                    .account_keys
                    .get(key_index)
                    .map(|key| (key_index, *key))
                    .ok_or_else(|| instruction_error(index, "invalid account index", Vec::new()))
            };
            let is_signer = |key_index: usize| key_index < message.header.num_required_signatures as usize;

            let program = message
                .account_keys
                .get(ix.program_id_index as usize)
                .copied()
                .unwrap_or_default();
            if program != self.program_id {
                return Err(instruction_error(index, "unsupported program id", Vec::new()));
            }

            let decoded = codec::decode_instruction(&ix.data).map_err(|_| {
                instruction_error(
                    index,
                    "custom program error: 0x65",
                    vec!["Program log: AnchorError occurred. Error Code: InstructionFallbackNotFound.".to_owned()],
                )
            })?;

            match decoded {
                Decoded::Initialize => {
                    let (target_index, target) = key_at(0)?;
                    let (user_index, _user) = key_at(1)?;
                    if !is_signer(target_index) || !is_signer(user_index) {
                        return Err(instruction_error(index, "missing required signature", Vec::new()));
                    }
                    if accounts.contains_key(&target) {
                        return Err(instruction_error(
                            index,
                            "custom program error: 0x0",
                            vec![format!(
                                "Allocate: account Address {{ address: {target}, base: None }} already in use"
                            )],
                        ));
                    }
                    let data = codec::encode_base_account(&BaseAccount::default(), self.space)
                        .ok_or_else(|| instruction_error(index, "account space too small", Vec::new()))?;
                    accounts.insert(
                        target,
                        AccountData {
                            owner: self.program_id,
                            lamports: RENT_LAMPORTS,
                            data,
                        },
                    );
                }
                Decoded::Append { link } => {
                    let (_, target) = key_at(0)?;
                    let (user_index, user) = key_at(1)?;
                    if !is_signer(user_index) {
                        return Err(instruction_error(index, "missing required signature", Vec::new()));
                    }
                    let account = accounts
                        .get_mut(&target)
                        .filter(|account| account.owner == self.program_id)
                        .ok_or_else(|| {
                            instruction_error(
                                index,
                                "custom program error: 0xbc4",
                                vec!["Program log: AnchorError caused by account: base_account. Error Code: AccountNotInitialized.".to_owned()],
                            )
                        })?;
                    let mut base = codec::decode_base_account(&account.data)
                        .map_err(|err| instruction_error(index, &err.0, Vec::new()))?;
                    base.total_gifs += 1;
                    base.gif_list.push(ItemStruct {
                        gif_link: link,
                        user_address: user.to_bytes(),
                    });
                    account.data = codec::encode_base_account(&base, self.space).ok_or_else(|| {
                        instruction_error(
                            index,
                            "custom program error: 0xbbc",
                            vec!["Program log: AnchorError caused by account: base_account. Error Code: AccountDidNotSerialize. Error Number: 3004. Error Message: Failed to serialize the account.".to_owned()],
                        )
                    })?;
                }
            }
        }

        state.accounts = accounts;
        Ok(())
    }
}

fn rejected(message: &str, logs: Vec<String>) -> ChainError {
    ChainError::Rejected {
        message: format!("Transaction simulation failed: {message}"),
        logs,
    }
}

fn instruction_error(index: usize, detail: &str, logs: Vec<String>) -> ChainError {
    rejected(&format!("Error processing Instruction {index}: {detail}"), logs)
}

#[async_trait]
impl LedgerRpc for InMemoryLedger {
    fn endpoint(&self) -> &str {
        "memory://"
    }

    async fn get_account(
        &self,
        address: &Pubkey,
        _commitment: CommitmentLevel,
    ) -> Result<Option<AccountData>, ChainError> {
        self.gate().await?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        Ok(state.accounts.get(address).cloned())
    }

    async fn latest_blockhash(&self, _commitment: CommitmentLevel) -> Result<Hash, ChainError> {
        self.gate().await?;
        let state = self.state.read().await;
        let digest = Sha256::digest(state.slot.to_le_bytes());
        let mut hash = [0_u8; 32];
        hash.copy_from_slice(&digest);
        Ok(Hash::new_from_array(hash))
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        _preflight: CommitmentLevel,
    ) -> Result<Signature, ChainError> {
        self.gate().await?;
        self.sends.fetch_add(1, Ordering::SeqCst);

        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| rejected("Transaction has no signatures", Vec::new()))?;
        Self::verify_signatures(tx)?;

        let mut state = self.state.write().await;
        self.execute(&mut state, tx)?;
        state.slot += 1;
        state.statuses.insert(
            signature,
            TxStatus {
                confirmation: Some(CommitmentLevel::Finalized),
                err: None,
            },
        );
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<TxStatus>, ChainError> {
        self.gate().await?;
        let state = self.state.read().await;
        Ok(state.statuses.get(signature).cloned())
    }
}
