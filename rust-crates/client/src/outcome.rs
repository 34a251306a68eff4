//! Round outcomes and running statistics.
//!
//! The program does not publish its counter-move, so every outcome produced
//! here is an estimate drawn client-side and labelled
//! [`OutcomeSource::Estimated`].

use crate::state::{
    AggregateStats,
    Move,
    OutcomeSource,
    RoundOutcome,
    RoundResult,
};
use rand::Rng;
use solana_sdk::signature::Signature;
use tracing::debug;

pub fn resolve(player: Move, counter: Move) -> RoundResult {
    if player == counter {
        RoundResult::Tie
    } else if player.beats() == counter {
        RoundResult::Win
    } else {
        RoundResult::Lose
    }
}

pub trait CounterMoveSource: Send + Sync {
    fn counter_move(&self) -> Move;
}

/// Uniform draw over the three moves.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCounterMove;

impl CounterMoveSource for RandomCounterMove {
    fn counter_move(&self) -> Move {
        let index = rand::rng().random_range(0..Move::ALL.len());
        Move::ALL[index]
    }
}

/// Always answers with the same move.
#[derive(Clone, Copy, Debug)]
pub struct FixedCounterMove(pub Move);

impl CounterMoveSource for FixedCounterMove {
    fn counter_move(&self) -> Move {
        self.0
    }
}

pub struct OutcomeReconciler {
    source: Box<dyn CounterMoveSource>,
    stats: AggregateStats,
    last_outcome: Option<RoundOutcome>,
}

impl OutcomeReconciler {
    pub fn new(source: Box<dyn CounterMoveSource>) -> Self {
        Self {
            source,
            stats: AggregateStats::default(),
            last_outcome: None,
        }
    }

    /// Outcome for a confirmed play. Call only after confirmation.
    pub fn reconcile(&self, player_move: Move, signature: Signature) -> RoundOutcome {
        let counter_move = self.source.counter_move();
        let result = resolve(player_move, counter_move);
        debug!(?player_move, ?counter_move, ?result, %signature, "estimated round outcome");
        RoundOutcome {
            player_move,
            counter_move,
            result,
            signature,
            source: OutcomeSource::Estimated,
        }
    }

    pub fn accumulate(&mut self, outcome: RoundOutcome) {
        self.stats.record(outcome.result);
        self.last_outcome = Some(outcome);
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    pub fn last_outcome(&self) -> Option<&RoundOutcome> {
        self.last_outcome.as_ref()
    }
}

impl Default for OutcomeReconciler {
    fn default() -> Self {
        Self::new(Box::new(RandomCounterMove))
    }
}
