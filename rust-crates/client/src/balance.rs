use crate::{
    error::TxError,
    rpc::ChainRpc,
    state::BalanceSnapshot,
};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::debug;

/// Balance reads for display. Never used to decide whether an operation may
/// proceed; the program and the network are the judges of that.
pub struct BalanceTracker {
    rpc: Arc<dyn ChainRpc>,
}

impl BalanceTracker {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self { rpc }
    }

    pub async fn refresh(&self, identity: &Pubkey) -> Result<u64, TxError> {
        let lamports = self.rpc.get_balance(identity).await?;
        debug!(%identity, lamports, "balance refreshed");
        Ok(lamports)
    }

    pub async fn refresh_snapshot(
        &self,
        player: &Pubkey,
        treasury: &Pubkey,
    ) -> Result<BalanceSnapshot, TxError> {
        let (player_lamports, treasury_lamports) =
            tokio::join!(self.refresh(player), self.refresh(treasury));
        Ok(BalanceSnapshot {
            player_lamports: player_lamports?,
            treasury_lamports: treasury_lamports?,
        })
    }
}
