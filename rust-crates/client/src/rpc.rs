use crate::error::RpcError;
use async_trait::async_trait;
use solana_client::{
    client_error::ClientError,
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{
        Transaction,
        TransactionError,
    },
};
use tracing::debug;

/// Read and submit operations the session layer needs from a node.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcError>;

    /// `None` when no account exists at `address`.
    async fn get_account_data(&self, address: &Pubkey)
    -> Result<Option<Vec<u8>>, RpcError>;

    async fn latest_blockhash(&self) -> Result<Hash, RpcError>;

    /// Submit without waiting for confirmation. Preflight rejections come back
    /// as `RpcError::Transaction`.
    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, RpcError>;

    /// `None` until the signature reaches `commitment`.
    async fn signature_status(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<Result<(), TransactionError>>, RpcError>;
}

pub struct SolanaRpc {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        let url = url.into();
        debug!(%url, ?commitment, "creating rpc client");
        Self {
            client: RpcClient::new_with_commitment(url, commitment),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

fn map_client_error(err: ClientError) -> RpcError {
    match err.get_transaction_error() {
        Some(tx_err) => RpcError::Transaction(tx_err),
        None => RpcError::Transport(err.to_string()),
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcError> {
        self.client
            .get_balance_with_commitment(address, self.commitment)
            .await
            .map(|response| response.value)
            .map_err(map_client_error)
    }

    async fn get_account_data(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<u8>>, RpcError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(map_client_error)?;
        Ok(response.value.map(|account| account.data))
    }

    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(map_client_error)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, RpcError> {
        let config = RpcSendTransactionConfig {
            preflight_commitment: Some(self.commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(map_client_error)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<Result<(), TransactionError>>, RpcError> {
        self.client
            .get_signature_status_with_commitment(signature, commitment)
            .await
            .map_err(map_client_error)
    }
}
