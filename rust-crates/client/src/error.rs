use solana_sdk::{
    instruction::InstructionError,
    pubkey::Pubkey,
    signature::Signature,
    transaction::TransactionError,
};
use thiserror::Error;

/// Anchor offsets user-defined program errors by this amount.
pub const ANCHOR_ERROR_OFFSET: u32 = 6000;

/// System program `ResultWithNegativeLamports`, raised by a transfer that
/// would overdraw the sender.
const SYSTEM_INSUFFICIENT_LAMPORTS: u32 = 1;

/// Errors surfaced by the RPC collaborator before they are classified.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The request never got a definitive answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node simulated or executed the transaction and rejected it.
    #[error("transaction rejected: {0:?}")]
    Transaction(TransactionError),
}

/// Errors surfaced by the wallet collaborator.
#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("signing request was rejected")]
    Rejected,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("failed to load wallet: {0}")]
    Load(String),
}

/// Typed result of every session operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("the wallet declined to sign")]
    UserRejected,

    /// The local wallet could not load or sign. Nothing was submitted.
    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("insufficient funds for this operation")]
    InsufficientFunds,

    /// Outcome unknown: the transaction may or may not have landed.
    #[error("network error: {0}")]
    Network(String),

    /// The node could not be reached before anything was submitted.
    #[error("rpc unavailable: {0}")]
    Unavailable(String),

    /// Outcome unknown: submission happened but confirmation never arrived.
    #[error("no confirmation for {signature} before the timeout")]
    Timeout { signature: Signature },

    #[error("program rejected the operation ({code:?}): {reason}")]
    Program { code: Option<u32>, reason: String },

    #[error("no plays left; pay to continue")]
    NoPlaysLeft,

    #[error("another operation is already in flight for this session")]
    Busy,

    #[error("no wallet connected")]
    NotConnected,

    #[error("session is not initialized")]
    NotInitialized,

    /// The last mutating call ended with an unknown outcome; refresh first.
    #[error("session state is stale; refresh before the next operation")]
    StaleSession,

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("invalid account data: {0}")]
    InvalidAccountData(String),

    #[error("invalid identity '{0}'")]
    InvalidIdentity(String),
}

impl TxError {
    /// True when the underlying transaction may have landed anyway.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, TxError::Network(_) | TxError::Timeout { .. })
    }

    pub fn from_transaction_error(err: &TransactionError) -> Self {
        match err {
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. } => {
                TxError::InsufficientFunds
            }
            TransactionError::InstructionError(
                _,
                InstructionError::Custom(SYSTEM_INSUFFICIENT_LAMPORTS),
            ) => TxError::InsufficientFunds,
            TransactionError::InstructionError(_, InstructionError::Custom(code))
                if *code >= ANCHOR_ERROR_OFFSET =>
            {
                TxError::Program {
                    code: Some(*code),
                    reason: program_error_reason(*code),
                }
            }
            other => TxError::Program {
                code: None,
                reason: format!("{other:?}"),
            },
        }
    }
}

impl From<RpcError> for TxError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport(msg) => TxError::Network(msg),
            RpcError::Transaction(tx_err) => TxError::from_transaction_error(&tx_err),
        }
    }
}

impl TxError {
    /// Classify an RPC failure that happened before submission. A transport
    /// error here cannot have landed anything.
    pub fn before_submission(err: RpcError) -> Self {
        match err {
            RpcError::Transport(msg) => TxError::Unavailable(msg),
            RpcError::Transaction(tx_err) => TxError::from_transaction_error(&tx_err),
        }
    }
}

impl From<WalletError> for TxError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => TxError::UserRejected,
            WalletError::Signing(msg) | WalletError::Load(msg) => TxError::Wallet(msg),
        }
    }
}

fn program_error_reason(code: u32) -> String {
    match code - ANCHOR_ERROR_OFFSET {
        0 => "NoPlaysLeft".to_string(),
        n => format!("custom program error {n}"),
    }
}
