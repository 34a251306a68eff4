#![allow(non_snake_case)]

use super::*;
use crate::{
    constants::DEFAULT_TREASURY,
    error::RpcError,
    instructions::encode_game_state,
    outcome::FixedCounterMove,
    state::RoundResult,
    test_helpers::{
        ConfirmMode,
        FAKE_RENT,
        FAKE_TX_FEE,
        FakeChain,
        FakeWallet,
    },
};
use async_trait::async_trait;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    native_token::LAMPORTS_PER_SOL,
    transaction::{
        Transaction,
        TransactionError,
    },
};
use std::time::Duration;

/// Delays every account read so a racing caller can finish first.
struct SlowAccountReads {
    chain: FakeChain,
    delay: Duration,
}

#[async_trait]
impl ChainRpc for SlowAccountReads {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcError> {
        self.chain.get_balance(address).await
    }

    async fn get_account_data(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<u8>>, RpcError> {
        let data = self.chain.get_account_data(address).await;
        tokio::time::sleep(self.delay).await;
        data
    }

    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        self.chain.latest_blockhash().await
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, RpcError> {
        self.chain.send_transaction(tx).await
    }

    async fn signature_status(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<Option<Result<(), TransactionError>>, RpcError> {
        self.chain.signature_status(signature, commitment).await
    }
}

struct Harness {
    chain: FakeChain,
    wallet: FakeWallet,
    controller: SessionController,
}

fn harness_with_funds(lamports: u64) -> Harness {
    let chain = FakeChain::new();
    harness_over(chain.clone(), Arc::new(chain), lamports)
}

fn slow_read_harness(delay: Duration) -> Harness {
    let chain = FakeChain::new();
    let rpc = Arc::new(SlowAccountReads {
        chain: chain.clone(),
        delay,
    });
    harness_over(chain, rpc, LAMPORTS_PER_SOL)
}

fn harness_over(chain: FakeChain, rpc: Arc<dyn ChainRpc>, lamports: u64) -> Harness {
    let wallet = FakeWallet::new();
    chain.fund(&wallet.pubkey(), lamports);
    let config = ClientConfig {
        program_id: chain.program_id(),
        confirm_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(100),
        ..ClientConfig::default()
    };
    let controller = SessionController::connect_with(
        rpc,
        Arc::new(wallet.clone()),
        config,
        SessionLocks::new(),
        Box::new(FixedCounterMove(Move::Scissors)),
    );
    Harness {
        chain,
        wallet,
        controller,
    }
}

fn harness() -> Harness {
    harness_with_funds(LAMPORTS_PER_SOL)
}

async fn ready_harness() -> Harness {
    let harness = harness();
    harness.controller.ensure_session().await.unwrap();
    harness.controller.pay_for_plays().await.unwrap();
    harness
}

#[test]
fn phase_of__no_controller__is_disconnected() {
    assert_eq!(phase_of(None), SessionPhase::Disconnected);
}

#[test]
fn connect__before_any_fetch__is_uninitialized() {
    let harness = harness();
    assert_eq!(phase_of(Some(&harness.controller)), SessionPhase::Uninitialized);
    assert!(harness.chain.submitted().is_empty());
}

#[tokio::test]
async fn ensure_session__fresh_wallet__creates_session_with_zero_plays() {
    // given
    let harness = harness();

    // when
    let session = harness.controller.ensure_session().await.unwrap();

    // then
    assert_eq!(
        session,
        Session {
            owner: harness.wallet.pubkey(),
            plays_left: 0,
        }
    );
    assert_eq!(harness.controller.phase(), SessionPhase::Exhausted);
    assert_eq!(harness.chain.submitted().len(), 1);
}

#[tokio::test]
async fn ensure_session__called_twice__second_call_submits_nothing() {
    // given
    let harness = harness();
    harness.controller.ensure_session().await.unwrap();

    // when
    harness.controller.ensure_session().await.unwrap();

    // then
    assert_eq!(harness.chain.submitted().len(), 1);
}

#[tokio::test]
async fn pay_for_plays__confirmed__adds_exactly_five_plays() {
    // given
    let harness = harness();
    let owner = harness.wallet.pubkey();
    harness.chain.set_account(
        &harness.controller.session_address(),
        encode_game_state(&Session {
            owner,
            plays_left: 2,
        }),
    );
    harness.controller.ensure_session().await.unwrap();

    // when
    harness.controller.pay_for_plays().await.unwrap();

    // then
    assert_eq!(harness.controller.session().unwrap().plays_left, 7);
    assert_eq!(harness.chain.balance(&DEFAULT_TREASURY), PAY_FOR_PLAYS_LAMPORTS);
    assert_eq!(
        harness.controller.balances().treasury_lamports,
        PAY_FOR_PLAYS_LAMPORTS
    );
}

#[tokio::test]
async fn make_play__five_rounds_then_sixth__counts_down_and_rejects_locally() {
    // given
    let harness = ready_harness().await;
    let mut plays_left = vec![harness.controller.session().unwrap().plays_left];

    // when
    for _ in 0..5 {
        harness.controller.make_play(Move::Rock).await.unwrap();
        plays_left.push(harness.controller.session().unwrap().plays_left);
    }
    let submitted_before = harness.chain.submitted().len();
    let sixth = harness.controller.make_play(Move::Rock).await;

    // then
    assert_eq!(plays_left, vec![5, 4, 3, 2, 1, 0]);
    assert_eq!(sixth.unwrap_err(), TxError::NoPlaysLeft);
    assert_eq!(harness.chain.submitted().len(), submitted_before);
    assert_eq!(harness.controller.phase(), SessionPhase::Exhausted);
    assert!(!harness.controller.is_busy());
}

#[tokio::test]
async fn make_play__confirmed__records_estimated_outcome() {
    // given
    let harness = ready_harness().await;

    // when
    let outcome = harness.controller.make_play(Move::Rock).await.unwrap();

    // then
    assert_eq!(outcome.counter_move, Move::Scissors);
    assert_eq!(outcome.result, RoundResult::Win);
    assert!(!outcome.is_verified());
    assert_eq!(harness.controller.last_outcome(), Some(outcome));
    let stats = harness.controller.stats();
    assert_eq!(stats.total_plays, 1);
    assert_eq!(stats.wins, 1);
    assert!(stats.is_consistent());
}

#[tokio::test]
async fn make_play__uninitialized__is_rejected_without_submitting() {
    let harness = harness();

    let err = harness.controller.make_play(Move::Paper).await.unwrap_err();

    assert_eq!(err, TxError::NotInitialized);
    assert!(harness.chain.submitted().is_empty());
}

#[tokio::test]
async fn pay_for_plays__balance_below_fee__is_insufficient_funds() {
    // given
    let harness = harness_with_funds(FAKE_RENT + 2 * FAKE_TX_FEE);
    harness.controller.ensure_session().await.unwrap();

    // when
    let err = harness.controller.pay_for_plays().await.unwrap_err();

    // then
    assert_eq!(err, TxError::InsufficientFunds);
    assert_eq!(harness.controller.session().unwrap().plays_left, 0);
    assert_eq!(harness.chain.session(&harness.wallet.pubkey()).unwrap().plays_left, 0);
    assert!(!harness.controller.is_busy());
    assert!(!harness.controller.is_stale());
}

#[tokio::test(start_paused = true)]
async fn make_play__timed_out__keeps_last_fetched_session_until_refresh() {
    // given
    let harness = ready_harness().await;
    harness.chain.set_confirm_mode(ConfirmMode::LandsUnconfirmed);

    // when
    let err = harness.controller.make_play(Move::Paper).await.unwrap_err();

    // then
    assert!(matches!(err, TxError::Timeout { .. }));
    assert_eq!(harness.controller.session().unwrap().plays_left, 5);
    assert_eq!(harness.controller.stats().total_plays, 0);
    assert!(harness.controller.is_stale());
    assert!(!harness.controller.is_busy());

    // when
    let submitted = harness.chain.submitted().len();
    let blocked = harness.controller.make_play(Move::Paper).await.unwrap_err();
    let phase = harness.controller.refresh().await.unwrap();

    // then
    assert_eq!(blocked, TxError::StaleSession);
    assert_eq!(harness.chain.submitted().len(), submitted);
    assert_eq!(phase, SessionPhase::Ready { plays_left: 4 });
    assert!(!harness.controller.is_stale());
}

#[tokio::test]
async fn pay_for_plays__transport_failure__marks_session_stale() {
    // given
    let harness = harness();
    harness.controller.ensure_session().await.unwrap();
    harness
        .chain
        .fail_next_send(RpcError::Transport("connection reset".into()));

    // when
    let err = harness.controller.pay_for_plays().await.unwrap_err();

    // then
    assert_eq!(err, TxError::Network("connection reset".into()));
    assert!(harness.controller.is_stale());
    assert_eq!(
        harness.controller.pay_for_plays().await.unwrap_err(),
        TxError::StaleSession
    );
}

#[tokio::test]
async fn pay_for_plays__wallet_rejects__releases_lock_and_keeps_session() {
    // given
    let harness = harness();
    harness.controller.ensure_session().await.unwrap();
    harness.wallet.set_reject(true);
    let signed_before = harness.wallet.signed_count();

    // when
    let err = harness.controller.pay_for_plays().await.unwrap_err();

    // then
    assert_eq!(err, TxError::UserRejected);
    assert_eq!(harness.wallet.signed_count(), signed_before);
    assert!(!harness.controller.is_busy());
    assert!(!harness.controller.is_stale());
    assert_eq!(harness.controller.session().unwrap().plays_left, 0);
    assert_eq!(harness.controller.errors().len(), 1);
}

#[tokio::test]
async fn pay_for_plays__blockhash_unavailable__fails_without_marking_stale() {
    // given
    let harness = harness();
    harness.controller.ensure_session().await.unwrap();
    let submitted_before = harness.chain.submitted().len();
    harness
        .chain
        .fail_reads(Some(RpcError::Transport("connection refused".into())));

    // when
    let err = harness.controller.pay_for_plays().await.unwrap_err();

    // then
    assert_eq!(err, TxError::Unavailable("connection refused".into()));
    assert!(!harness.controller.is_stale());
    assert_eq!(harness.chain.submitted().len(), submitted_before);

    // when
    harness.chain.fail_reads(None);
    let retried = harness.controller.pay_for_plays().await;

    // then
    assert!(retried.is_ok());
    assert_eq!(harness.controller.session().unwrap().plays_left, 5);
}

async fn one_play_left(harness: &Harness) {
    harness.chain.set_account(
        &harness.controller.session_address(),
        encode_game_state(&Session {
            owner: harness.wallet.pubkey(),
            plays_left: 1,
        }),
    );
    harness.controller.ensure_session().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn ensure_session__racing_a_play__cannot_restore_a_spent_play() {
    // given
    let harness = slow_read_harness(Duration::from_millis(50));
    one_play_left(&harness).await;

    // when
    let (played, ensured) = tokio::join!(
        harness.controller.make_play(Move::Rock),
        harness.controller.ensure_session()
    );

    // then
    assert!(played.is_ok());
    assert_eq!(ensured.unwrap_err(), TxError::Busy);
    assert_eq!(harness.chain.session(&harness.wallet.pubkey()).unwrap().plays_left, 0);
    assert_eq!(harness.controller.session().unwrap().plays_left, 0);

    // when
    let submitted = harness.chain.submitted().len();
    let next = harness.controller.make_play(Move::Rock).await;

    // then
    assert_eq!(next.unwrap_err(), TxError::NoPlaysLeft);
    assert_eq!(harness.chain.submitted().len(), submitted);
}

#[tokio::test(start_paused = true)]
async fn make_play__while_ensure_session_reads__is_busy() {
    // given
    let harness = slow_read_harness(Duration::from_millis(50));
    one_play_left(&harness).await;
    let submitted = harness.chain.submitted().len();

    // when
    let (ensured, played) = tokio::join!(
        harness.controller.ensure_session(),
        harness.controller.make_play(Move::Rock)
    );

    // then
    assert_eq!(ensured.unwrap().plays_left, 1);
    assert_eq!(played.unwrap_err(), TxError::Busy);
    assert_eq!(harness.chain.submitted().len(), submitted);
    assert_eq!(harness.controller.session().unwrap().plays_left, 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_balances__while_play_in_flight__is_busy() {
    // given
    let harness = slow_read_harness(Duration::from_millis(50));
    one_play_left(&harness).await;

    // when
    let (played, balances) = tokio::join!(
        harness.controller.make_play(Move::Rock),
        harness.controller.refresh_balances()
    );

    // then
    assert!(played.is_ok());
    assert_eq!(balances.unwrap_err(), TxError::Busy);
    assert_eq!(
        harness.controller.balances().player_lamports,
        harness.chain.balance(&harness.wallet.pubkey())
    );
}

#[tokio::test]
async fn pay_for_plays__concurrent_requests__second_is_busy() {
    // given
    let harness = harness();
    harness.controller.ensure_session().await.unwrap();
    let submitted_before = harness.chain.submitted().len();

    // when
    let (first, second) = tokio::join!(
        harness.controller.pay_for_plays(),
        harness.controller.pay_for_plays()
    );

    // then
    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), TxError::Busy);
    assert_eq!(harness.chain.submitted().len(), submitted_before + 1);
    assert_eq!(harness.controller.session().unwrap().plays_left, 5);
}

#[tokio::test]
async fn refresh__while_operation_in_flight__is_busy() {
    // given
    let harness = ready_harness().await;

    // when
    let (play, refresh) = tokio::join!(
        harness.controller.make_play(Move::Rock),
        harness.controller.refresh()
    );

    // then
    assert!(play.is_ok());
    assert_eq!(refresh.unwrap_err(), TxError::Busy);
}

#[tokio::test]
async fn refresh__no_session_on_chain__is_uninitialized() {
    let harness = harness();

    let phase = harness.controller.refresh().await.unwrap();

    assert_eq!(phase, SessionPhase::Uninitialized);
    assert_eq!(harness.controller.balances().player_lamports, LAMPORTS_PER_SOL);
    assert!(harness.chain.submitted().is_empty());
}

#[tokio::test]
async fn errors__keep_only_the_latest_fifty() {
    // given
    let harness = harness();
    harness.controller.ensure_session().await.unwrap();
    harness.wallet.set_reject(true);

    // when
    for _ in 0..55 {
        let _ = harness.controller.pay_for_plays().await;
    }

    // then
    assert_eq!(harness.controller.errors().len(), MAX_ERRORS);
    assert_eq!(harness.controller.snapshot().errors.len(), 5);
}

#[tokio::test]
async fn disconnect__returns_accumulated_stats() {
    // given
    let harness = ready_harness().await;
    harness.controller.make_play(Move::Scissors).await.unwrap();

    // when
    let stats = harness.controller.disconnect();

    // then
    assert_eq!(stats.total_plays, 1);
    assert_eq!(stats.ties, 1);
}
