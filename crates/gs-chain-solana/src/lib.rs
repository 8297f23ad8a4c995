use async_trait::async_trait;
use gs_api_types::CommitmentLevel;
use gs_chain_client::{AccountData, ChainError, Hash, LedgerRpc, Pubkey, Signature, Transaction, TxStatus};
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::commitment_config::{self, CommitmentConfig};
use tracing::debug;

/// JSON-RPC code the ledger uses when transaction simulation fails during preflight.
const PREFLIGHT_FAILURE: i64 = -32002;

/// Solana cluster adapter over the nonblocking `RpcClient`.
pub struct SolanaRpcAdapter {
    endpoint: String,
    rpc: RpcClient,
}

impl SolanaRpcAdapter {
    pub fn new(endpoint: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/').to_owned();
        Self {
            rpc: RpcClient::new_with_commitment(endpoint.clone(), CommitmentConfig::processed()),
            endpoint,
        }
    }
}

fn commitment_config(level: CommitmentLevel) -> CommitmentConfig {
    match level {
        CommitmentLevel::Processed => CommitmentConfig::processed(),
        CommitmentLevel::Confirmed => CommitmentConfig::confirmed(),
        CommitmentLevel::Finalized => CommitmentConfig::finalized(),
    }
}

fn preflight_level(level: CommitmentLevel) -> commitment_config::CommitmentLevel {
    commitment_config(level).commitment
}

fn classify(method: &str, err: ClientError) -> ChainError {
    match err.kind() {
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, data }) => {
            let logs = match data {
                RpcResponseErrorData::SendTransactionPreflightFailure(simulation) => simulation.logs.clone(),
                _ => None,
            };
            classify_response(*code, message, logs)
        }
        ClientErrorKind::RpcError(RpcError::ParseError(detail)) => ChainError::Decode(format!("{method}: {detail}")),
        ClientErrorKind::SerdeJson(detail) => ChainError::Decode(format!("{method}: {detail}")),
        ClientErrorKind::TransactionError(tx_err) => ChainError::Rejected {
            message: tx_err.to_string(),
            logs: Vec::new(),
        },
        _ => ChainError::Transport(format!("{method}: {err}")),
    }
}

fn classify_response(code: i64, message: &str, logs: Option<Vec<String>>) -> ChainError {
    if code == PREFLIGHT_FAILURE {
        return ChainError::Rejected {
            message: message.to_owned(),
            logs: logs.unwrap_or_default(),
        };
    }
    ChainError::Rpc {
        code,
        message: message.to_owned(),
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpcAdapter {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_account(
        &self,
        address: &Pubkey,
        commitment: CommitmentLevel,
    ) -> Result<Option<AccountData>, ChainError> {
        debug!(%address, %commitment, endpoint = %self.endpoint, "getAccountInfo");
        let response = self
            .rpc
            .get_account_with_commitment(address, commitment_config(commitment))
            .await
            .map_err(|err| classify("getAccountInfo", err))?;

        Ok(response.value.map(|account| AccountData {
            owner: account.owner,
            lamports: account.lamports,
            data: account.data,
        }))
    }

    async fn latest_blockhash(&self, commitment: CommitmentLevel) -> Result<Hash, ChainError> {
        let (blockhash, _last_valid_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(commitment_config(commitment))
            .await
            .map_err(|err| classify("getLatestBlockhash", err))?;
        Ok(blockhash)
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        preflight: CommitmentLevel,
    ) -> Result<Signature, ChainError> {
        debug!(signatures = tx.signatures.len(), %preflight, endpoint = %self.endpoint, "sendTransaction");
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(preflight_level(preflight)),
            ..RpcSendTransactionConfig::default()
        };
        self.rpc
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|err| classify("sendTransaction", err))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<TxStatus>, ChainError> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|err| classify("getSignatureStatuses", err))?;

        Ok(response.value.into_iter().next().flatten().map(|status| {
            let confirmation = [
                CommitmentLevel::Finalized,
                CommitmentLevel::Confirmed,
                CommitmentLevel::Processed,
            ]
            .into_iter()
            .find(|level| status.satisfies_commitment(commitment_config(*level)));
            TxStatus {
                confirmation,
                err: status.err.as_ref().map(ToString::to_string),
            }
        }))
    }
}
