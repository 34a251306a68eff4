use crate::{
    constants::SESSION_SEED,
    error::TxError,
};
use solana_sdk::pubkey::Pubkey;
use std::{
    fmt,
    str::FromStr,
};

/// Program-derived address of an owner's game state account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionAddress {
    address: Pubkey,
    bump: u8,
}

impl SessionAddress {
    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn bump(&self) -> u8 {
        self.bump
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

pub fn derive_session_address(
    program_id: &Pubkey,
    seed: &[u8],
    owner: &Pubkey,
) -> SessionAddress {
    let (address, bump) =
        Pubkey::find_program_address(&[seed, owner.as_ref()], program_id);
    SessionAddress { address, bump }
}

/// Session address under the game's fixed seed.
pub fn session_address_for(program_id: &Pubkey, owner: &Pubkey) -> SessionAddress {
    derive_session_address(program_id, SESSION_SEED, owner)
}

pub fn parse_identity(raw: &str) -> Result<Pubkey, TxError> {
    Pubkey::from_str(raw.trim()).map_err(|_| TxError::InvalidIdentity(raw.to_string()))
}
