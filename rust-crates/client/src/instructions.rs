//! Wire format of the rock-paper-scissors program.
//!
//! The program follows the Anchor conventions: every instruction starts with
//! `sha256("global:<name>")[..8]` and every account with
//! `sha256("account:<Type>")[..8]`.

use crate::{
    error::TxError,
    state::{
        Move,
        Session,
    },
};
use sha2::{
    Digest,
    Sha256,
};
use solana_sdk::{
    instruction::{
        AccountMeta,
        Instruction,
    },
    pubkey::Pubkey,
    system_program,
};

pub const DISCRIMINATOR_LEN: usize = 8;

/// discriminator + owner + plays_left
pub const GAME_STATE_LEN: usize = DISCRIMINATOR_LEN + 32 + 1;

const GAME_STATE_ACCOUNT: &str = "GameState";

pub fn instruction_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    sighash("global", name)
}

pub fn account_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    sighash("account", name)
}

fn sighash(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(format!("{namespace}:{name}").as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

pub fn initialize(program_id: &Pubkey, game_state: &Pubkey, player: &Pubkey) -> Instruction {
    let accounts = vec![
        AccountMeta::new(*game_state, false),
        AccountMeta::new(*player, true),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data: instruction_discriminator("initialize").to_vec(),
    }
}

pub fn pay_for_plays(
    program_id: &Pubkey,
    game_state: &Pubkey,
    player: &Pubkey,
    treasury: &Pubkey,
) -> Instruction {
    let accounts = vec![
        AccountMeta::new(*game_state, false),
        AccountMeta::new(*player, true),
        AccountMeta::new(*treasury, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data: instruction_discriminator("pay_for_plays").to_vec(),
    }
}

pub fn make_play(
    program_id: &Pubkey,
    game_state: &Pubkey,
    player: &Pubkey,
    treasury: &Pubkey,
    player_move: Move,
) -> Instruction {
    let accounts = vec![
        AccountMeta::new(*game_state, false),
        AccountMeta::new(*player, true),
        AccountMeta::new(*treasury, false),
    ];

    let mut data = instruction_discriminator("make_play").to_vec();
    data.push(player_move.as_u8());

    Instruction {
        program_id: *program_id,
        accounts,
        data,
    }
}

/// Decode a game state account. Trailing bytes (padding, newer fields) are
/// ignored.
pub fn decode_game_state(data: &[u8]) -> Result<Session, TxError> {
    if data.len() < GAME_STATE_LEN {
        return Err(TxError::InvalidAccountData(format!(
            "game state account holds {} bytes, expected at least {GAME_STATE_LEN}",
            data.len()
        )));
    }
    let expected = account_discriminator(GAME_STATE_ACCOUNT);
    let actual = &data[..DISCRIMINATOR_LEN];
    if actual != expected {
        return Err(TxError::InvalidAccountData(format!(
            "unexpected discriminator {} (expected {})",
            hex::encode(actual),
            hex::encode(expected)
        )));
    }
    let owner_end = DISCRIMINATOR_LEN + 32;
    let owner = Pubkey::try_from(&data[DISCRIMINATOR_LEN..owner_end])
        .map_err(|e| TxError::InvalidAccountData(format!("owner field: {e}")))?;
    let plays_left = data[owner_end];
    Ok(Session { owner, plays_left })
}

pub fn encode_game_state(session: &Session) -> Vec<u8> {
    let mut data = Vec::with_capacity(GAME_STATE_LEN);
    data.extend_from_slice(&account_discriminator(GAME_STATE_ACCOUNT));
    data.extend_from_slice(session.owner.as_ref());
    data.push(session.plays_left);
    data
}
