use anyhow::{Context, bail};
use gs_api_types::{Cluster, CommitmentLevel, ConnectionDescriptor};
use gs_chain_client::{LedgerRpc, Pubkey};
use gs_chain_solana::SolanaRpcAdapter;
use gs_crypto::Ed25519Signer;
use gs_portal_core::{InMemoryLedger, KeypairWallet, TargetAccount, Timeouts, WalletProvider};
use gs_secrets::SecretStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LedgerMode {
    Rpc,
    Memory,
}

#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) cluster: Cluster,
    pub(crate) commitment: CommitmentLevel,
    pub(crate) program_id: Pubkey,
    pub(crate) target_secret: String,
    pub(crate) secret_store: String,
    pub(crate) secret_token: Option<String>,
    pub(crate) target_account: Option<Pubkey>,
    pub(crate) wallet_keypair: Option<PathBuf>,
    pub(crate) wallet_trusted: bool,
    pub(crate) ledger: LedgerMode,
    pub(crate) timeouts: Timeouts,
    /// Sessions with no request for this long are closed.
    pub(crate) session_ttl: Duration,
}

impl ServiceConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every setting through `lookup`; blank values count as unset.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let bind_addr = get("GS_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_owned())
            .parse::<SocketAddr>()
            .context("GS_BIND_ADDR must be host:port")?;

        let cluster = match get("GS_CLUSTER") {
            Some(value) => value
                .parse::<Cluster>()
                .map_err(anyhow::Error::msg)
                .context("invalid GS_CLUSTER")?,
            None => Cluster::Devnet,
        };

        let commitment = match get("GS_COMMITMENT") {
            Some(value) => value
                .parse::<CommitmentLevel>()
                .map_err(anyhow::Error::msg)
                .context("invalid GS_COMMITMENT")?,
            None => CommitmentLevel::default(),
        };

        let program_id = get("GS_PROGRAM_ID")
            .context("GS_PROGRAM_ID is required")?
            .parse::<Pubkey>()
            .context("GS_PROGRAM_ID is not a valid address")?;

        let target_account = get("GS_TARGET_ACCOUNT")
            .map(|value| value.parse::<Pubkey>())
            .transpose()
            .context("GS_TARGET_ACCOUNT is not a valid address")?;

        let ledger = match get("GS_LEDGER").as_deref() {
            None | Some("rpc") => LedgerMode::Rpc,
            Some("memory") => LedgerMode::Memory,
            Some(other) => bail!("GS_LEDGER must be `rpc` or `memory`, got `{other}`"),
        };

        let defaults = Timeouts::default();
        let millis = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match get(key) {
                Some(value) => Ok(Duration::from_millis(
                    value.parse::<u64>().with_context(|| format!("{key} must be milliseconds"))?,
                )),
                None => Ok(default),
            }
        };
        let timeouts = Timeouts {
            call: millis("GS_CALL_TIMEOUT_MS", defaults.call)?,
            confirm: millis("GS_CONFIRM_TIMEOUT_MS", defaults.confirm)?,
            poll_interval: millis("GS_POLL_INTERVAL_MS", defaults.poll_interval)?,
        };

        let session_ttl = match get("GS_SESSION_TTL_SECS") {
            Some(value) => Duration::from_secs(
                value
                    .parse::<u64>()
                    .context("GS_SESSION_TTL_SECS must be seconds")?,
            ),
            None => DEFAULT_SESSION_TTL,
        };
        if session_ttl.is_zero() {
            bail!("GS_SESSION_TTL_SECS must be greater than zero");
        }

        Ok(Self {
            bind_addr,
            cluster,
            commitment,
            program_id,
            target_secret: get("GS_TARGET_SECRET").unwrap_or_else(|| "target-account".to_owned()),
            secret_store: get("GS_SECRET_STORE").unwrap_or_else(|| "env".to_owned()),
            secret_token: get("GS_SECRET_TOKEN"),
            target_account,
            wallet_keypair: get("GS_WALLET_KEYPAIR").map(PathBuf::from),
            wallet_trusted: get("GS_WALLET_TRUSTED").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            ledger,
            timeouts,
            session_ttl,
        })
    }

    pub(crate) fn connection(&self) -> ConnectionDescriptor {
        match self.ledger {
            LedgerMode::Rpc => ConnectionDescriptor::new(&self.cluster, self.commitment),
            LedgerMode::Memory => ConnectionDescriptor {
                endpoint_url: "memory://".to_owned(),
                commitment: self.commitment,
            },
        }
    }

    pub(crate) fn ledger(&self) -> Arc<dyn LedgerRpc> {
        match self.ledger {
            LedgerMode::Rpc => Arc::new(SolanaRpcAdapter::new(self.cluster.url())),
            LedgerMode::Memory => Arc::new(InMemoryLedger::new(self.program_id)),
        }
    }

    /// Loads the target account keypair from the secret store, falling back to
    /// the configured address (read and append only).
    pub(crate) async fn target(&self, secrets: &dyn SecretStore) -> anyhow::Result<TargetAccount> {
        let secret = secrets
            .load_secret(&self.target_secret)
            .await
            .with_context(|| format!("failed to read secret `{}` from {} store", self.target_secret, secrets.kind()))?;

        let Some(secret) = secret else {
            let Some(address) = self.target_account else {
                bail!(
                    "no target account: secret `{}` is missing from the {} store and GS_TARGET_ACCOUNT is unset",
                    self.target_secret,
                    secrets.kind()
                );
            };
            warn!(%address, "target keypair not provisioned; initialization disabled");
            return Ok(TargetAccount::address_only(address));
        };

        let json = std::str::from_utf8(&secret).context("target keypair secret is not utf-8")?;
        let keypair = Ed25519Signer::from_keypair_json(json).context("target keypair secret is malformed")?;
        let target = TargetAccount::from_keypair(keypair);

        if let Some(expected) = self.target_account {
            if expected != *target.address() {
                bail!(
                    "GS_TARGET_ACCOUNT {expected} does not match the provisioned keypair {}",
                    target.address()
                );
            }
        }
        info!(address = %target.address(), source = secrets.kind(), "target keypair loaded");
        Ok(target)
    }

    /// Without a keypair file the service runs with no signing capability.
    pub(crate) async fn wallet(&self) -> anyhow::Result<Option<Arc<dyn WalletProvider>>> {
        let Some(path) = &self.wallet_keypair else {
            return Ok(None);
        };
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read wallet keypair {}", path.display()))?;
        let signer = Ed25519Signer::from_keypair_json(&json)
            .with_context(|| format!("wallet keypair {} is malformed", path.display()))?;
        let wallet = KeypairWallet::new(signer, self.wallet_trusted);
        info!(address = %wallet.address(), trusted = self.wallet_trusted, "wallet keypair loaded");
        Ok(Some(Arc::new(wallet)))
    }
}
