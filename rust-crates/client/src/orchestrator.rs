//! Build → sign → submit → confirm for every state-mutating operation.
//!
//! Nothing here retries. A submitted transaction cannot be recalled, so a
//! timeout or transport failure after submission leaves the outcome unknown
//! and the caller must re-fetch the session before deciding what to do next.

use crate::{
    address::{
        SessionAddress,
        session_address_for,
    },
    config::ClientConfig,
    error::{
        RpcError,
        TxError,
    },
    instructions,
    locks::{
        SessionGuard,
        SessionLocks,
    },
    rpc::ChainRpc,
    state::Move,
    wallet::WalletSigner,
};
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use std::{
    fmt,
    sync::Arc,
    time::Duration,
};
use tokio::time::{
    self,
    Instant,
};
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    PayForPlays { treasury: Pubkey },
    MakePlay { treasury: Pubkey, player_move: Move },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Initialize => write!(f, "initialize"),
            Operation::PayForPlays { .. } => write!(f, "pay_for_plays"),
            Operation::MakePlay { player_move, .. } => {
                write!(f, "make_play({player_move:?})")
            }
        }
    }
}

pub struct TransactionOrchestrator {
    rpc: Arc<dyn ChainRpc>,
    wallet: Arc<dyn WalletSigner>,
    config: ClientConfig,
    locks: SessionLocks,
}

impl TransactionOrchestrator {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        wallet: Arc<dyn WalletSigner>,
        config: ClientConfig,
        locks: SessionLocks,
    ) -> Self {
        Self {
            rpc,
            wallet,
            config,
            locks,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    pub fn session_address(&self, owner: &Pubkey) -> SessionAddress {
        session_address_for(&self.config.program_id, owner)
    }

    /// Claim the owner's session for one mutating operation. Fails with
    /// `Busy` while another is in flight.
    pub fn lock_session(&self, owner: &Pubkey) -> Result<SessionGuard, TxError> {
        let address = self.session_address(owner);
        self.locks.try_acquire(address.address())
    }

    pub async fn initialize(&self, owner: &Pubkey) -> Result<Signature, TxError> {
        let guard = self.lock_session(owner)?;
        self.execute(&guard, owner, Operation::Initialize).await
    }

    pub async fn pay_for_plays(
        &self,
        owner: &Pubkey,
        treasury: &Pubkey,
    ) -> Result<Signature, TxError> {
        let guard = self.lock_session(owner)?;
        self.execute(
            &guard,
            owner,
            Operation::PayForPlays {
                treasury: *treasury,
            },
        )
        .await
    }

    pub async fn make_play(
        &self,
        owner: &Pubkey,
        treasury: &Pubkey,
        player_move: Move,
    ) -> Result<Signature, TxError> {
        let guard = self.lock_session(owner)?;
        self.execute(
            &guard,
            owner,
            Operation::MakePlay {
                treasury: *treasury,
                player_move,
            },
        )
        .await
    }

    /// Run one operation under a guard the caller already holds. The caller
    /// keeps the guard afterwards so it can re-fetch state before releasing.
    pub async fn execute(
        &self,
        guard: &SessionGuard,
        owner: &Pubkey,
        operation: Operation,
    ) -> Result<Signature, TxError> {
        let address = self.session_address(owner);
        if guard.session() != address.address() {
            return Err(TxError::Busy);
        }
        if *owner != self.wallet.pubkey() {
            return Err(TxError::InvalidIdentity(owner.to_string()));
        }

        let instruction = self.build(&address, owner, operation);
        let tx = self.prepare(owner, instruction).await?;
        let signed = self.wallet.sign_transaction(tx).await.map_err(|e| {
            info!(%operation, error = %e, "signing declined");
            TxError::from(e)
        })?;

        let signature = match self.rpc.send_transaction(&signed).await {
            Ok(signature) => signature,
            Err(e) => {
                let err = TxError::from(e);
                log_failure(operation, None, &err);
                return Err(err);
            }
        };
        info!(%operation, %signature, session = %address, "submitted");

        match self.await_confirmation(&signature).await {
            Ok(()) => {
                info!(%operation, %signature, "confirmed");
                Ok(signature)
            }
            Err(err) => {
                log_failure(operation, Some(&signature), &err);
                Err(err)
            }
        }
    }

    fn build(
        &self,
        address: &SessionAddress,
        owner: &Pubkey,
        operation: Operation,
    ) -> Instruction {
        let program_id = &self.config.program_id;
        let game_state = address.address();
        match operation {
            Operation::Initialize => instructions::initialize(program_id, &game_state, owner),
            Operation::PayForPlays { treasury } => {
                instructions::pay_for_plays(program_id, &game_state, owner, &treasury)
            }
            Operation::MakePlay {
                treasury,
                player_move,
            } => instructions::make_play(
                program_id,
                &game_state,
                owner,
                &treasury,
                player_move,
            ),
        }
    }

    async fn prepare(
        &self,
        payer: &Pubkey,
        instruction: Instruction,
    ) -> Result<Transaction, TxError> {
        let blockhash = self
            .rpc
            .latest_blockhash()
            .await
            .map_err(TxError::before_submission)?;
        let mut tx = Transaction::new_with_payer(&[instruction], Some(payer));
        tx.message.recent_blockhash = blockhash;
        Ok(tx)
    }

    /// Poll the signature status until it settles at the configured
    /// commitment. Only the waiting stops at the deadline. A timeout too
    /// large to represent means no deadline at all.
    async fn await_confirmation(&self, signature: &Signature) -> Result<(), TxError> {
        let deadline = Instant::now().checked_add(self.config.confirm_timeout);
        loop {
            match self
                .rpc
                .signature_status(signature, self.config.commitment)
                .await
            {
                Ok(Some(Ok(()))) => return Ok(()),
                Ok(Some(Err(tx_err))) => {
                    return Err(TxError::from_transaction_error(&tx_err));
                }
                Ok(None) => {}
                Err(RpcError::Transport(msg)) => {
                    debug!(%signature, %msg, "status poll failed; still waiting");
                }
                Err(RpcError::Transaction(tx_err)) => {
                    return Err(TxError::from_transaction_error(&tx_err));
                }
            }
            if past_deadline(deadline, self.config.poll_interval) {
                return Err(TxError::Timeout {
                    signature: *signature,
                });
            }
            time::sleep(self.config.poll_interval).await;
        }
    }
}

// true when the next poll would land after the deadline
fn past_deadline(deadline: Option<Instant>, poll_interval: Duration) -> bool {
    match deadline {
        Some(deadline) => Instant::now()
            .checked_add(poll_interval)
            .is_none_or(|next_poll| next_poll > deadline),
        None => false,
    }
}

fn log_failure(operation: Operation, signature: Option<&Signature>, err: &TxError) {
    let signature = signature.map(ToString::to_string).unwrap_or_default();
    if err.is_outcome_unknown() {
        warn!(%operation, %signature, error = %err, "outcome unknown; session must be re-fetched");
    } else {
        info!(%operation, %signature, error = %err, "operation failed");
    }
}
