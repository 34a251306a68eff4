//! Client for the on-chain rock-paper-scissors program: session lookup and
//! creation, paid plays, and a transaction lifecycle that never guesses at
//! outcomes it has not seen confirmed.

pub mod address;
pub mod balance;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod instructions;
pub mod locks;
pub mod orchestrator;
pub mod outcome;
pub mod rpc;
pub mod session;
pub mod state;
pub mod wallet;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use address::{
    SessionAddress,
    derive_session_address,
    parse_identity,
    session_address_for,
};
pub use config::{
    ClientConfig,
    NetworkTarget,
};
pub use controller::{
    ControllerSnapshot,
    SessionController,
    phase_of,
};
pub use error::{
    RpcError,
    TxError,
    WalletError,
};
pub use rpc::{
    ChainRpc,
    SolanaRpc,
};
pub use state::{
    AggregateStats,
    BalanceSnapshot,
    Move,
    OutcomeSource,
    RoundOutcome,
    RoundResult,
    Session,
    SessionPhase,
};
pub use wallet::{
    KeypairWallet,
    WalletSigner,
};
