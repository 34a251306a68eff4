use solana_sdk::{
    native_token::LAMPORTS_PER_SOL,
    pubkey,
    pubkey::Pubkey,
};

/// Seed prefix of the per-owner game state account.
pub const SESSION_SEED: &[u8] = b"game_state";

/// 0.01 SOL buys one batch of plays.
pub const PAY_FOR_PLAYS_LAMPORTS: u64 = LAMPORTS_PER_SOL / 100;

pub const PLAYS_PER_PAYMENT: u8 = 5;

pub const DEFAULT_PROGRAM_ID: Pubkey =
    pubkey!("Fg1PynP5JPrFhvfQ18RmPkfGM4YHTGpmV5pW547uR2Bq");

pub const DEFAULT_TREASURY: Pubkey =
    pubkey!("xuSBAdPizFNZFmBL9j8qe2RrZXK6XLF1kugz2ziwU3E");

pub const DEFAULT_DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_TESTNET_RPC_URL: &str = "https://api.testnet.solana.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8899";
