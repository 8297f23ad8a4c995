use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How far a transaction or read must have progressed before it is treated as final.
///
/// Variants are ordered from weakest to strongest so that `a >= b` reads as
/// "a satisfies a requirement of b".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentLevel {
    Processed,
    Confirmed,
    Finalized,
}

impl CommitmentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentLevel::Processed => "processed",
            CommitmentLevel::Confirmed => "confirmed",
            CommitmentLevel::Finalized => "finalized",
        }
    }

    pub fn is_satisfied_by(&self, reached: CommitmentLevel) -> bool {
        reached >= *self
    }
}

impl Default for CommitmentLevel {
    fn default() -> Self {
        CommitmentLevel::Processed
    }
}

impl fmt::Display for CommitmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitmentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(CommitmentLevel::Processed),
            "confirmed" => Ok(CommitmentLevel::Confirmed),
            "finalized" => Ok(CommitmentLevel::Finalized),
            other => Err(format!("unknown commitment level: {other}")),
        }
    }
}

/// Well-known public clusters, or a custom RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cluster {
    Devnet,
    Testnet,
    MainnetBeta,
    Localnet,
    Custom(String),
}

impl Cluster {
    pub fn url(&self) -> &str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Cluster::Localnet => "http://127.0.0.1:8899",
            Cluster::Custom(url) => url,
        }
    }
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value {
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "mainnet" | "mainnet-beta" => Ok(Cluster::MainnetBeta),
            "localnet" | "localhost" => Ok(Cluster::Localnet),
            url if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(Cluster::Custom(url.trim_end_matches('/').to_owned()))
            }
            other => Err(format!("unknown cluster or endpoint: {other}")),
        }
    }
}

/// Network endpoint and commitment level. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub endpoint_url: String,
    pub commitment: CommitmentLevel,
}

impl ConnectionDescriptor {
    pub fn new(cluster: &Cluster, commitment: CommitmentLevel) -> Self {
        Self {
            endpoint_url: cluster.url().to_owned(),
            commitment,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SignerIdentity {
    pub public_address: String,
}

impl SignerIdentity {
    pub fn new(public_address: impl Into<String>) -> Self {
        Self {
            public_address: public_address.into(),
        }
    }
}

impl fmt::Display for SignerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.public_address)
    }
}

/// One record stored in the target account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub link: String,
    pub submitter_address: String,
}

/// What a front end should present for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UiMode {
    Disconnected,
    /// Connected, first read of the target account still outstanding.
    Loading,
    NeedsInitialization,
    Ready { entries: Vec<Entry> },
    Error { message: String },
}

// ── HTTP bodies ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub signer: Option<SignerIdentity>,
    pub mode: UiMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitEntryRequest {
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfigResponse {
    pub connection: ConnectionDescriptor,
    pub program_id: String,
    pub target_account: String,
    pub can_initialize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_ordering_matches_finality() {
        assert!(CommitmentLevel::Processed.is_satisfied_by(CommitmentLevel::Confirmed));
        assert!(CommitmentLevel::Confirmed.is_satisfied_by(CommitmentLevel::Finalized));
        assert!(!CommitmentLevel::Finalized.is_satisfied_by(CommitmentLevel::Confirmed));
        assert_eq!("Confirmed".parse::<CommitmentLevel>(), Ok(CommitmentLevel::Confirmed));
        assert!("rooted".parse::<CommitmentLevel>().is_err());
    }

    #[test]
    fn cluster_resolves_known_names_and_urls() {
        assert_eq!("devnet".parse::<Cluster>().unwrap().url(), "https://api.devnet.solana.com");
        assert_eq!(
            "http://localhost:8899/".parse::<Cluster>().unwrap(),
            Cluster::Custom("http://localhost:8899".to_owned())
        );
        assert!("moonnet".parse::<Cluster>().is_err());
    }

    #[test]
    fn ui_mode_is_tagged_by_mode() {
        let json = serde_json::to_value(UiMode::Ready {
            entries: vec![Entry {
                link: "a.gif".to_owned(),
                submitter_address: "addr".to_owned(),
            }],
        })
        .unwrap();
        assert_eq!(json["mode"], "ready");
        assert_eq!(json["entries"][0]["link"], "a.gif");

        let json = serde_json::to_value(UiMode::NeedsInitialization).unwrap();
        assert_eq!(json, serde_json::json!({ "mode": "needs_initialization" }));
    }
}
