use crate::constants::{
    DEFAULT_DEVNET_RPC_URL,
    DEFAULT_LOCAL_RPC_URL,
    DEFAULT_PROGRAM_ID,
    DEFAULT_TESTNET_RPC_URL,
    DEFAULT_TREASURY,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
};
use std::time::Duration;

pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkTarget {
    Devnet { url: String },
    Testnet { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn devnet() -> Self {
        NetworkTarget::Devnet {
            url: DEFAULT_DEVNET_RPC_URL.to_string(),
        }
    }

    pub fn testnet() -> Self {
        NetworkTarget::Testnet {
            url: DEFAULT_TESTNET_RPC_URL.to_string(),
        }
    }

    pub fn local() -> Self {
        NetworkTarget::LocalNode {
            url: DEFAULT_LOCAL_RPC_URL.to_string(),
        }
    }

    pub fn with_url(self, url: impl Into<String>) -> Self {
        let url = url.into();
        match self {
            NetworkTarget::Devnet { .. } => NetworkTarget::Devnet { url },
            NetworkTarget::Testnet { .. } => NetworkTarget::Testnet { url },
            NetworkTarget::LocalNode { .. } => NetworkTarget::LocalNode { url },
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Devnet { url }
            | NetworkTarget::Testnet { url }
            | NetworkTarget::LocalNode { url } => url,
        }
    }

    /// Explorer link for a transaction on this cluster.
    pub fn explorer_tx_url(&self, signature: &str) -> String {
        let cluster = match self {
            NetworkTarget::Devnet { .. } => "devnet".to_string(),
            NetworkTarget::Testnet { .. } => "testnet".to_string(),
            NetworkTarget::LocalNode { url } => {
                format!("custom&customUrl={url}")
            }
        };
        format!("https://explorer.solana.com/tx/{signature}?cluster={cluster}")
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub program_id: Pubkey,
    pub treasury: Pubkey,
    pub commitment: CommitmentConfig,
    /// How long to wait for confirmation before reporting `Timeout`.
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID,
            treasury: DEFAULT_TREASURY,
            commitment: CommitmentConfig::confirmed(),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

pub fn parse_commitment(raw: &str) -> Option<CommitmentConfig> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "processed" => Some(CommitmentConfig::processed()),
        "confirmed" => Some(CommitmentConfig::confirmed()),
        "finalized" => Some(CommitmentConfig::finalized()),
        _ => None,
    }
}
