use crate::{
    address::SessionAddress,
    error::TxError,
    instructions::decode_game_state,
    locks::SessionGuard,
    orchestrator::{
        Operation,
        TransactionOrchestrator,
    },
    rpc::ChainRpc,
    state::Session,
};
use solana_sdk::pubkey::Pubkey;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};
use tracing::{
    debug,
    info,
};

/// Reads the on-chain session record and creates it when it is missing.
pub struct SessionClient {
    rpc: Arc<dyn ChainRpc>,
    orchestrator: Arc<TransactionOrchestrator>,
    init_gates: Mutex<HashMap<Pubkey, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionClient {
    pub fn new(rpc: Arc<dyn ChainRpc>, orchestrator: Arc<TransactionOrchestrator>) -> Self {
        Self {
            rpc,
            orchestrator,
            init_gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn address_for(&self, owner: &Pubkey) -> SessionAddress {
        self.orchestrator.session_address(owner)
    }

    /// Current record at `address`. `AccountNotFound` when it does not exist.
    pub async fn fetch(&self, address: &Pubkey) -> Result<Session, TxError> {
        match self.rpc.get_account_data(address).await? {
            Some(data) => {
                let session = decode_game_state(&data)?;
                debug!(%address, plays_left = session.plays_left, "session fetched");
                Ok(session)
            }
            None => Err(TxError::AccountNotFound(*address)),
        }
    }

    /// Fetch the owner's session, submitting `initialize` only when the
    /// account does not exist yet. Concurrent callers for the same owner are
    /// serialized; the later one sees the created account and submits nothing.
    /// Fails with `Busy` while another mutating operation holds the session.
    pub async fn ensure_initialized(&self, owner: &Pubkey) -> Result<Session, TxError> {
        let address = self.address_for(owner).address();
        let gate = self.gate_for(address);
        let _permit = gate.lock().await;
        let guard = self.orchestrator.lock_session(owner)?;
        self.ensure_initialized_locked(&guard, owner).await
    }

    /// Same as [`SessionClient::ensure_initialized`] for a caller that
    /// already holds the session guard and keeps it until it has stored the
    /// result.
    pub async fn ensure_initialized_locked(
        &self,
        guard: &SessionGuard,
        owner: &Pubkey,
    ) -> Result<Session, TxError> {
        let address = self.address_for(owner).address();
        match self.fetch(&address).await {
            Ok(session) => Ok(session),
            Err(TxError::AccountNotFound(_)) => {
                info!(%owner, session = %address, "no session on chain; initializing");
                self.orchestrator
                    .execute(guard, owner, Operation::Initialize)
                    .await?;
                self.fetch(&address).await
            }
            Err(err) => Err(err),
        }
    }

    fn gate_for(&self, address: Pubkey) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self
            .init_gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        gates.entry(address).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        config::ClientConfig,
        constants::PAY_FOR_PLAYS_LAMPORTS,
        instructions::encode_game_state,
        locks::SessionLocks,
        test_helpers::{
            FakeChain,
            FakeWallet,
        },
    };

    fn session_client(chain: &FakeChain, wallet: &FakeWallet) -> SessionClient {
        let config = ClientConfig {
            program_id: chain.program_id(),
            ..ClientConfig::default()
        };
        let rpc: Arc<dyn ChainRpc> = Arc::new(chain.clone());
        let orchestrator = Arc::new(TransactionOrchestrator::new(
            rpc.clone(),
            Arc::new(wallet.clone()),
            config,
            SessionLocks::new(),
        ));
        SessionClient::new(rpc, orchestrator)
    }

    #[tokio::test]
    async fn fetch__missing_account__is_account_not_found() {
        let chain = FakeChain::new();
        let sut = session_client(&chain, &FakeWallet::new());
        let address = Pubkey::new_unique();

        let err = sut.fetch(&address).await.unwrap_err();

        assert_eq!(err, TxError::AccountNotFound(address));
    }

    #[tokio::test]
    async fn fetch__garbage_data__is_invalid_account_data() {
        let chain = FakeChain::new();
        let address = Pubkey::new_unique();
        chain.set_account(&address, vec![1, 2, 3]);
        let sut = session_client(&chain, &FakeWallet::new());

        let err = sut.fetch(&address).await.unwrap_err();

        assert!(matches!(err, TxError::InvalidAccountData(_)));
    }

    #[tokio::test]
    async fn ensure_initialized__existing_session__submits_nothing() {
        // given
        let chain = FakeChain::new();
        let wallet = FakeWallet::new();
        let sut = session_client(&chain, &wallet);
        let owner = wallet.pubkey();
        let existing = Session {
            owner,
            plays_left: 3,
        };
        chain.set_account(&sut.address_for(&owner).address(), encode_game_state(&existing));

        // when
        let session = sut.ensure_initialized(&owner).await.unwrap();

        // then
        assert_eq!(session, existing);
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn ensure_initialized__missing_session__creates_it_with_zero_plays() {
        // given
        let chain = FakeChain::new();
        let wallet = FakeWallet::new();
        chain.fund(&wallet.pubkey(), PAY_FOR_PLAYS_LAMPORTS);
        let sut = session_client(&chain, &wallet);

        // when
        let session = sut.ensure_initialized(&wallet.pubkey()).await.unwrap();

        // then
        assert_eq!(session.owner, wallet.pubkey());
        assert_eq!(session.plays_left, 0);
        assert_eq!(chain.submitted().len(), 1);
    }

    #[tokio::test]
    async fn ensure_initialized__concurrent_callers__submit_one_initialize() {
        // given
        let chain = FakeChain::new();
        let wallet = FakeWallet::new();
        chain.fund(&wallet.pubkey(), PAY_FOR_PLAYS_LAMPORTS);
        let sut = session_client(&chain, &wallet);
        let owner = wallet.pubkey();

        // when
        let (first, second) =
            tokio::join!(sut.ensure_initialized(&owner), sut.ensure_initialized(&owner));

        // then
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(chain.submitted().len(), 1);
    }

    #[tokio::test]
    async fn ensure_initialized__session_held_by_another_operation__is_busy() {
        // given
        let chain = FakeChain::new();
        let wallet = FakeWallet::new();
        chain.fund(&wallet.pubkey(), PAY_FOR_PLAYS_LAMPORTS);
        let sut = session_client(&chain, &wallet);
        let owner = wallet.pubkey();
        let _held = sut.orchestrator.lock_session(&owner).unwrap();

        // when
        let err = sut.ensure_initialized(&owner).await.unwrap_err();

        // then
        assert_eq!(err, TxError::Busy);
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn ensure_initialized_locked__missing_session__initializes_under_the_callers_guard()
    {
        // given
        let chain = FakeChain::new();
        let wallet = FakeWallet::new();
        chain.fund(&wallet.pubkey(), PAY_FOR_PLAYS_LAMPORTS);
        let sut = session_client(&chain, &wallet);
        let owner = wallet.pubkey();
        let guard = sut.orchestrator.lock_session(&owner).unwrap();

        // when
        let session = sut.ensure_initialized_locked(&guard, &owner).await.unwrap();

        // then
        assert_eq!(session.plays_left, 0);
        assert_eq!(chain.submitted().len(), 1);
        assert!(sut.orchestrator.locks().is_locked(&guard.session()));
    }
}
