use crate::{
    address::SessionAddress,
    balance::BalanceTracker,
    config::ClientConfig,
    constants::{
        PAY_FOR_PLAYS_LAMPORTS,
        PLAYS_PER_PAYMENT,
    },
    error::TxError,
    locks::{
        SessionGuard,
        SessionLocks,
    },
    orchestrator::{
        Operation,
        TransactionOrchestrator,
    },
    outcome::{
        CounterMoveSource,
        OutcomeReconciler,
        RandomCounterMove,
    },
    rpc::ChainRpc,
    session::SessionClient,
    state::{
        AggregateStats,
        BalanceSnapshot,
        Move,
        RoundOutcome,
        Session,
        SessionPhase,
        short_identity,
    },
    wallet::WalletSigner,
};
use solana_sdk::{
    native_token::lamports_to_sol,
    pubkey::Pubkey,
    signature::Signature,
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
};
use tracing::{
    error,
    info,
    warn,
};

#[cfg(test)]
mod tests;

const MAX_ERRORS: usize = 50;

/// Point-in-time view of a connected session for display.
#[derive(Clone, Debug)]
pub struct ControllerSnapshot {
    pub owner: Pubkey,
    pub session_address: Pubkey,
    pub phase: SessionPhase,
    pub balances: BalanceSnapshot,
    pub stats: AggregateStats,
    pub last_outcome: Option<RoundOutcome>,
    pub stale: bool,
    pub status: String,
    /// Most recent first.
    pub errors: Vec<String>,
}

struct ControllerState {
    session: Option<Session>,
    balances: BalanceSnapshot,
    reconciler: OutcomeReconciler,
    stale: bool,
    status: String,
    errors: Vec<String>,
}

/// One connected wallet's session. Created by [`SessionController::connect`]
/// and consumed by [`SessionController::disconnect`].
pub struct SessionController {
    owner: Pubkey,
    address: SessionAddress,
    treasury: Pubkey,
    orchestrator: Arc<TransactionOrchestrator>,
    sessions: SessionClient,
    balances: BalanceTracker,
    state: Mutex<ControllerState>,
}

impl SessionController {
    pub fn connect(
        rpc: Arc<dyn ChainRpc>,
        wallet: Arc<dyn WalletSigner>,
        config: ClientConfig,
    ) -> Self {
        Self::connect_with(
            rpc,
            wallet,
            config,
            SessionLocks::new(),
            Box::new(RandomCounterMove),
        )
    }

    pub fn connect_with(
        rpc: Arc<dyn ChainRpc>,
        wallet: Arc<dyn WalletSigner>,
        config: ClientConfig,
        locks: SessionLocks,
        counter_moves: Box<dyn CounterMoveSource>,
    ) -> Self {
        let owner = wallet.pubkey();
        let treasury = config.treasury;
        let orchestrator = Arc::new(TransactionOrchestrator::new(
            rpc.clone(),
            wallet,
            config,
            locks,
        ));
        let address = orchestrator.session_address(&owner);
        info!(owner = %owner, session = %address, "wallet connected");

        Self {
            owner,
            address,
            treasury,
            sessions: SessionClient::new(rpc.clone(), orchestrator.clone()),
            balances: BalanceTracker::new(rpc),
            orchestrator,
            state: Mutex::new(ControllerState {
                session: None,
                balances: BalanceSnapshot::default(),
                reconciler: OutcomeReconciler::new(counter_moves),
                stale: false,
                status: format!("Connected {}", short_identity(&owner)),
                errors: Vec::new(),
            }),
        }
    }

    /// Ends the session and hands back what was accumulated.
    pub fn disconnect(self) -> AggregateStats {
        let stats = self.stats();
        info!(owner = %self.owner, total_plays = stats.total_plays, "wallet disconnected");
        stats
    }

    pub fn owner(&self) -> Pubkey {
        self.owner
    }

    pub fn session_address(&self) -> Pubkey {
        self.address.address()
    }

    pub fn treasury(&self) -> Pubkey {
        self.treasury
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state().session {
            Some(session) => session.phase(),
            None => SessionPhase::Uninitialized,
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.state().session
    }

    pub fn stats(&self) -> AggregateStats {
        self.state().reconciler.stats()
    }

    pub fn balances(&self) -> BalanceSnapshot {
        self.state().balances
    }

    pub fn last_outcome(&self) -> Option<RoundOutcome> {
        self.state().reconciler.last_outcome().cloned()
    }

    pub fn status(&self) -> String {
        self.state().status.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.state().errors.clone()
    }

    pub fn is_stale(&self) -> bool {
        self.state().stale
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.locks().is_locked(&self.address.address())
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let phase = self.phase();
        let state = self.state();
        ControllerSnapshot {
            owner: self.owner,
            session_address: self.address.address(),
            phase,
            balances: state.balances,
            stats: state.reconciler.stats(),
            last_outcome: state.reconciler.last_outcome().cloned(),
            stale: state.stale,
            status: state.status.clone(),
            errors: state.errors.iter().rev().take(5).cloned().collect(),
        }
    }

    /// Load the session, creating it on chain the first time this wallet
    /// plays. The guard is held until the result is stored, so a read taken
    /// here can never overwrite the state a concurrent play confirmed.
    pub async fn ensure_session(&self) -> Result<Session, TxError> {
        self.check_not_stale()?;
        let guard = self.orchestrator.lock_session(&self.owner)?;
        match self
            .sessions
            .ensure_initialized_locked(&guard, &self.owner)
            .await
        {
            Ok(session) => {
                let mut state = self.state();
                state.session = Some(session);
                set_status(
                    &mut state,
                    format!("Session ready: {} plays left", session.plays_left),
                );
                Ok(session)
            }
            Err(err) => Err(self.operation_failed("Initialization failed", err)),
        }
    }

    /// Re-read the session and both balances. Clears the stale mark.
    pub async fn refresh(&self) -> Result<SessionPhase, TxError> {
        let _guard = self.orchestrator.lock_session(&self.owner)?;

        let session = match self.sessions.fetch(&self.address.address()).await {
            Ok(session) => Some(session),
            Err(TxError::AccountNotFound(_)) => None,
            Err(err) => return Err(self.read_failed("Refresh failed", err)),
        };
        let balances = self
            .balances
            .refresh_snapshot(&self.owner, &self.treasury)
            .await
            .map_err(|err| self.read_failed("Balance refresh failed", err))?;

        let mut state = self.state();
        if state.stale {
            info!(session = %self.address, "stale session refreshed");
        }
        state.session = session;
        state.balances = balances;
        state.stale = false;
        set_status(&mut state, "Refreshed");
        Ok(match session {
            Some(session) => session.phase(),
            None => SessionPhase::Uninitialized,
        })
    }

    pub async fn refresh_balances(&self) -> Result<BalanceSnapshot, TxError> {
        let _guard = self.orchestrator.lock_session(&self.owner)?;
        let balances = self
            .balances
            .refresh_snapshot(&self.owner, &self.treasury)
            .await
            .map_err(|err| self.read_failed("Balance refresh failed", err))?;
        self.state().balances = balances;
        Ok(balances)
    }

    pub async fn pay_for_plays(&self) -> Result<Signature, TxError> {
        self.check_not_stale()?;
        let guard = self.orchestrator.lock_session(&self.owner)?;
        if self.state().session.is_none() {
            return Err(TxError::NotInitialized);
        }

        let operation = Operation::PayForPlays {
            treasury: self.treasury,
        };
        let signature = match self.orchestrator.execute(&guard, &self.owner, operation).await
        {
            Ok(signature) => signature,
            Err(err) => return Err(self.operation_failed("Payment failed", err)),
        };

        self.sync_after_confirmation(&guard).await;
        set_status(
            &mut self.state(),
            format!(
                "Paid {} SOL for {PLAYS_PER_PAYMENT} plays",
                lamports_to_sol(PAY_FOR_PLAYS_LAMPORTS)
            ),
        );
        Ok(signature)
    }

    /// Play one round. Rejected locally, with nothing submitted, unless the
    /// last fetched session has plays left.
    pub async fn make_play(&self, player_move: Move) -> Result<RoundOutcome, TxError> {
        self.check_not_stale()?;
        let guard = self.orchestrator.lock_session(&self.owner)?;
        if let Err(err) = self.phase().check_can_play() {
            if err == TxError::NoPlaysLeft {
                set_status(&mut self.state(), "No plays left! Pay to continue.");
            }
            return Err(err);
        }

        let operation = Operation::MakePlay {
            treasury: self.treasury,
            player_move,
        };
        let signature = match self.orchestrator.execute(&guard, &self.owner, operation).await
        {
            Ok(signature) => signature,
            Err(err) => return Err(self.operation_failed("Play failed", err)),
        };

        let outcome = {
            let mut state = self.state();
            let outcome = state.reconciler.reconcile(player_move, signature);
            state.reconciler.accumulate(outcome.clone());
            outcome
        };
        self.sync_after_confirmation(&guard).await;
        set_status(
            &mut self.state(),
            format!(
                "{} vs {}: {} (estimated)",
                outcome.player_move, outcome.counter_move, outcome.result
            ),
        );
        Ok(outcome)
    }

    // Runs while the caller still holds the session guard, so no other
    // mutation can slip in between confirmation and the re-read.
    async fn sync_after_confirmation(&self, _guard: &SessionGuard) {
        match self.sessions.fetch(&self.address.address()).await {
            Ok(session) => self.state().session = Some(session),
            Err(err) => {
                warn!(session = %self.address, error = %err, "post-confirmation fetch failed");
                let mut state = self.state();
                state.stale = true;
                push_errors(&mut state, vec![format!("Session re-fetch failed: {err}")]);
            }
        }
        match self
            .balances
            .refresh_snapshot(&self.owner, &self.treasury)
            .await
        {
            Ok(balances) => self.state().balances = balances,
            Err(err) => {
                let mut state = self.state();
                push_errors(&mut state, vec![format!("Balance refresh failed: {err}")]);
            }
        }
    }

    fn check_not_stale(&self) -> Result<(), TxError> {
        if self.state().stale {
            return Err(TxError::StaleSession);
        }
        Ok(())
    }

    fn operation_failed(&self, context: &str, err: TxError) -> TxError {
        let mut state = self.state();
        if err.is_outcome_unknown() {
            warn!(session = %self.address, error = %err, "marking session stale");
            state.stale = true;
        }
        state.status = format!("{context}: {err}");
        push_errors(&mut state, vec![format!("{context}: {err}")]);
        err
    }

    fn read_failed(&self, context: &str, err: TxError) -> TxError {
        let mut state = self.state();
        state.status = format!("{context}: {err}");
        push_errors(&mut state, vec![format!("{context}: {err}")]);
        err
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Phase of an optional connection; no controller means no wallet.
pub fn phase_of(controller: Option<&SessionController>) -> SessionPhase {
    controller
        .map(SessionController::phase)
        .unwrap_or(SessionPhase::Disconnected)
}

fn set_status(state: &mut ControllerState, message: impl Into<String>) {
    state.status = message.into();
    state.errors.clear();
}

fn push_errors(state: &mut ControllerState, mut items: Vec<String>) {
    if items.is_empty() {
        return;
    }
    for item in &items {
        error!("{}", item);
    }
    state.errors.append(&mut items);
    if state.errors.len() > MAX_ERRORS {
        let drain = state.errors.len() - MAX_ERRORS;
        state.errors.drain(0..drain);
    }
}
