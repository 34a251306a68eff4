use crate::error::TxError;
use serde::{
    Deserialize,
    Serialize,
};
use solana_sdk::{
    native_token::lamports_to_sol,
    pubkey::Pubkey,
    signature::Signature,
};
use std::{
    fmt,
    str::FromStr,
};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    Rock = 0,
    Paper = 1,
    Scissors = 2,
}

impl Move {
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Move::Rock),
            1 => Some(Move::Paper),
            2 => Some(Move::Scissors),
            _ => None,
        }
    }

    /// The move this one beats.
    pub fn beats(self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Paper => Move::Rock,
            Move::Scissors => Move::Paper,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Move::Rock => "🪨",
            Move::Paper => "📄",
            Move::Scissors => "✂️",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Move::Rock => "Rock",
            Move::Paper => "Paper",
            Move::Scissors => "Scissors",
        };
        write!(f, "{} {name}", self.emoji())
    }
}

impl FromStr for Move {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" | "r" | "0" => Ok(Move::Rock),
            "paper" | "p" | "1" => Ok(Move::Paper),
            "scissors" | "s" | "2" => Ok(Move::Scissors),
            other => Err(format!("unknown move '{other}' (rock, paper, scissors)")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundResult {
    Win,
    Lose,
    Tie,
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundResult::Win => write!(f, "🎉 You won!"),
            RoundResult::Lose => write!(f, "😢 You lost!"),
            RoundResult::Tie => write!(f, "🤝 Tie!"),
        }
    }
}

/// Authoritative game record, as last fetched from the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    pub owner: Pubkey,
    pub plays_left: u8,
}

impl Session {
    pub fn phase(&self) -> SessionPhase {
        if self.plays_left == 0 {
            SessionPhase::Exhausted
        } else {
            SessionPhase::Ready {
                plays_left: self.plays_left,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Uninitialized,
    Ready { plays_left: u8 },
    Exhausted,
}

impl SessionPhase {
    /// Local gate for `make_play`; rejected phases never reach the network.
    pub fn check_can_play(&self) -> Result<(), TxError> {
        match self {
            SessionPhase::Ready { .. } => Ok(()),
            SessionPhase::Exhausted => Err(TxError::NoPlaysLeft),
            SessionPhase::Uninitialized => Err(TxError::NotInitialized),
            SessionPhase::Disconnected => Err(TxError::NotConnected),
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Disconnected => write!(f, "disconnected"),
            SessionPhase::Uninitialized => write!(f, "uninitialized"),
            SessionPhase::Ready { plays_left } => write!(f, "ready ({plays_left} left)"),
            SessionPhase::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Where a round's counter-move came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeSource {
    /// Computed client-side; not verified against the ledger.
    Estimated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    pub player_move: Move,
    pub counter_move: Move,
    pub result: RoundResult,
    pub signature: Signature,
    pub source: OutcomeSource,
}

impl RoundOutcome {
    pub fn is_verified(&self) -> bool {
        !matches!(self.source, OutcomeSource::Estimated)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_plays: u64,
    pub wins: u64,
    pub losses: u64,
    pub ties: u64,
}

impl AggregateStats {
    pub fn record(&mut self, result: RoundResult) {
        match result {
            RoundResult::Win => self.wins += 1,
            RoundResult::Lose => self.losses += 1,
            RoundResult::Tie => self.ties += 1,
        }
        self.total_plays += 1;
    }

    /// Percentage of rounds won, 0 before the first round.
    pub fn win_rate(&self) -> f64 {
        let total = self.wins + self.losses + self.ties;
        if total == 0 {
            return 0.0;
        }
        self.wins as f64 / total as f64 * 100.0
    }

    pub fn is_consistent(&self) -> bool {
        self.total_plays == self.wins + self.losses + self.ties
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub player_lamports: u64,
    pub treasury_lamports: u64,
}

impl BalanceSnapshot {
    pub fn player_sol(&self) -> f64 {
        lamports_to_sol(self.player_lamports)
    }

    pub fn treasury_sol(&self) -> f64 {
        lamports_to_sol(self.treasury_lamports)
    }
}

/// `abcd...wxyz` form of an identity for status lines.
pub fn short_identity(identity: &Pubkey) -> String {
    let full = identity.to_string();
    if full.len() <= 8 {
        return full;
    }
    format!("{}...{}", &full[..4], &full[full.len() - 4..])
}
