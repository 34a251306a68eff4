//! In-memory chain and wallet for exercising the session layer without a node.
//!
//! `FakeChain` runs a small model of the game program: it creates session
//! records, charges the play fee, counts plays down, and rejects with the
//! same error codes the deployed program and the system program use.

use crate::{
    address::session_address_for,
    constants::{
        DEFAULT_PROGRAM_ID,
        PAY_FOR_PLAYS_LAMPORTS,
        PLAYS_PER_PAYMENT,
    },
    error::{
        ANCHOR_ERROR_OFFSET,
        RpcError,
        WalletError,
    },
    instructions::{
        DISCRIMINATOR_LEN,
        decode_game_state,
        encode_game_state,
        instruction_discriminator,
    },
    rpc::ChainRpc,
    state::{
        Move,
        Session,
    },
    wallet::WalletSigner,
};
use async_trait::async_trait;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    instruction::{
        CompiledInstruction,
        InstructionError,
    },
    pubkey::Pubkey,
    signature::{
        Keypair,
        Signature,
        Signer,
    },
    transaction::{
        Transaction,
        TransactionError,
    },
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
    },
};

pub const FAKE_TX_FEE: u64 = 5_000;
pub const FAKE_RENT: u64 = 1_000_000;

const ACCOUNT_ALREADY_IN_USE: u32 = 0;
const RESULT_WITH_NEGATIVE_LAMPORTS: u32 = 1;
const CONSTRAINT_HAS_ONE: u32 = 2001;
const CONSTRAINT_SEEDS: u32 = 2006;
const ACCOUNT_NOT_INITIALIZED: u32 = 3012;

/// What happens to a transaction after it is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Lands and reports confirmed.
    Immediate,
    /// Lands, but no status ever comes back.
    LandsUnconfirmed,
    /// Never lands and no status ever comes back.
    Dropped,
}

#[derive(Clone)]
struct Ledger {
    accounts: HashMap<Pubkey, Vec<u8>>,
    balances: HashMap<Pubkey, u64>,
}

struct ChainState {
    ledger: Ledger,
    statuses: HashMap<Signature, Result<(), TransactionError>>,
    submitted: Vec<Signature>,
    confirm_mode: ConfirmMode,
    next_send_error: Option<RpcError>,
    read_error: Option<RpcError>,
}

#[derive(Clone)]
pub struct FakeChain {
    program_id: Pubkey,
    state: Arc<Mutex<ChainState>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    pub fn new() -> Self {
        Self::with_program_id(DEFAULT_PROGRAM_ID)
    }

    pub fn with_program_id(program_id: Pubkey) -> Self {
        Self {
            program_id,
            state: Arc::new(Mutex::new(ChainState {
                ledger: Ledger {
                    accounts: HashMap::new(),
                    balances: HashMap::new(),
                },
                statuses: HashMap::new(),
                submitted: Vec::new(),
                confirm_mode: ConfirmMode::Immediate,
                next_send_error: None,
                read_error: None,
            })),
        }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn fund(&self, identity: &Pubkey, lamports: u64) {
        *self.state().ledger.balances.entry(*identity).or_default() += lamports;
    }

    pub fn balance(&self, identity: &Pubkey) -> u64 {
        self.state()
            .ledger
            .balances
            .get(identity)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_account(&self, address: &Pubkey, data: Vec<u8>) {
        self.state().ledger.accounts.insert(*address, data);
    }

    /// The owner's session as currently stored, bypassing read failures.
    pub fn session(&self, owner: &Pubkey) -> Option<Session> {
        let address = session_address_for(&self.program_id, owner).address();
        self.state()
            .ledger
            .accounts
            .get(&address)
            .and_then(|data| decode_game_state(data).ok())
    }

    pub fn submitted(&self) -> Vec<Signature> {
        self.state().submitted.clone()
    }

    pub fn set_confirm_mode(&self, mode: ConfirmMode) {
        self.state().confirm_mode = mode;
    }

    pub fn fail_next_send(&self, err: RpcError) {
        self.state().next_send_error = Some(err);
    }

    /// Fail every read (balances, accounts, statuses) until cleared.
    pub fn fail_reads(&self, err: Option<RpcError>) {
        self.state().read_error = err;
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reads(&self) -> Result<(), RpcError> {
        match &self.state().read_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn execute(&self, ledger: &mut Ledger, tx: &Transaction) -> Result<(), TransactionError> {
        let keys = &tx.message.account_keys;
        let payer = *keys.first().ok_or(TransactionError::AccountNotFound)?;
        let payer_balance = ledger.balances.entry(payer).or_default();
        if *payer_balance < FAKE_TX_FEE {
            return Err(TransactionError::InsufficientFundsForFee);
        }
        *payer_balance -= FAKE_TX_FEE;

        for (index, ix) in tx.message.instructions.iter().enumerate() {
            self.apply(ledger, keys, ix)
                .map_err(|err| TransactionError::InstructionError(index as u8, err))?;
        }
        Ok(())
    }

    fn apply(
        &self,
        ledger: &mut Ledger,
        keys: &[Pubkey],
        ix: &CompiledInstruction,
    ) -> Result<(), InstructionError> {
        let program = keys
            .get(ix.program_id_index as usize)
            .ok_or(InstructionError::NotEnoughAccountKeys)?;
        if *program != self.program_id {
            return Err(InstructionError::IncorrectProgramId);
        }
        let account = |position: usize| -> Result<Pubkey, InstructionError> {
            ix.accounts
                .get(position)
                .and_then(|key_index| keys.get(*key_index as usize))
                .copied()
                .ok_or(InstructionError::NotEnoughAccountKeys)
        };
        if ix.data.len() < DISCRIMINATOR_LEN {
            return Err(InstructionError::InvalidInstructionData);
        }
        let (discriminator, args) = ix.data.split_at(DISCRIMINATOR_LEN);

        let game_state = account(0)?;
        let player = account(1)?;
        if session_address_for(&self.program_id, &player).address() != game_state {
            return Err(InstructionError::Custom(CONSTRAINT_SEEDS));
        }

        if discriminator == instruction_discriminator("initialize") {
            if ledger.accounts.contains_key(&game_state) {
                return Err(InstructionError::Custom(ACCOUNT_ALREADY_IN_USE));
            }
            debit(ledger, &player, FAKE_RENT)?;
            let session = Session {
                owner: player,
                plays_left: 0,
            };
            ledger.accounts.insert(game_state, encode_game_state(&session));
            return Ok(());
        }

        let mut session = load_session(ledger, &game_state, &player)?;
        let treasury = account(2)?;
        if discriminator == instruction_discriminator("pay_for_plays") {
            debit(ledger, &player, PAY_FOR_PLAYS_LAMPORTS)?;
            *ledger.balances.entry(treasury).or_default() += PAY_FOR_PLAYS_LAMPORTS;
            session.plays_left = session.plays_left.saturating_add(PLAYS_PER_PAYMENT);
        } else if discriminator == instruction_discriminator("make_play") {
            args.first()
                .and_then(|raw| Move::from_u8(*raw))
                .ok_or(InstructionError::InvalidInstructionData)?;
            if session.plays_left == 0 {
                return Err(InstructionError::Custom(ANCHOR_ERROR_OFFSET));
            }
            session.plays_left -= 1;
        } else {
            return Err(InstructionError::InvalidInstructionData);
        }
        ledger.accounts.insert(game_state, encode_game_state(&session));
        Ok(())
    }
}

fn debit(ledger: &mut Ledger, identity: &Pubkey, lamports: u64) -> Result<(), InstructionError> {
    let balance = ledger.balances.entry(*identity).or_default();
    if *balance < lamports {
        return Err(InstructionError::Custom(RESULT_WITH_NEGATIVE_LAMPORTS));
    }
    *balance -= lamports;
    Ok(())
}

fn load_session(
    ledger: &Ledger,
    game_state: &Pubkey,
    player: &Pubkey,
) -> Result<Session, InstructionError> {
    let data = ledger
        .accounts
        .get(game_state)
        .ok_or(InstructionError::Custom(ACCOUNT_NOT_INITIALIZED))?;
    let session = decode_game_state(data).map_err(|_| InstructionError::InvalidAccountData)?;
    if session.owner != *player {
        return Err(InstructionError::Custom(CONSTRAINT_HAS_ONE));
    }
    Ok(session)
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcError> {
        tokio::task::yield_now().await;
        self.check_reads()?;
        Ok(self.balance(address))
    }

    async fn get_account_data(
        &self,
        address: &Pubkey,
    ) -> Result<Option<Vec<u8>>, RpcError> {
        tokio::task::yield_now().await;
        self.check_reads()?;
        Ok(self.state().ledger.accounts.get(address).cloned())
    }

    async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
        tokio::task::yield_now().await;
        self.check_reads()?;
        Ok(Hash::new_unique())
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, RpcError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if let Some(err) = state.next_send_error.take() {
            return Err(err);
        }
        tx.verify().map_err(RpcError::Transaction)?;
        let signature = tx.signatures[0];
        state.submitted.push(signature);

        // preflight: nothing is applied when simulation fails
        let mut ledger = state.ledger.clone();
        self.execute(&mut ledger, tx)
            .map_err(RpcError::Transaction)?;

        match state.confirm_mode {
            ConfirmMode::Immediate => {
                state.ledger = ledger;
                state.statuses.insert(signature, Ok(()));
            }
            ConfirmMode::LandsUnconfirmed => state.ledger = ledger,
            ConfirmMode::Dropped => {}
        }
        Ok(signature)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
        _commitment: CommitmentConfig,
    ) -> Result<Option<Result<(), TransactionError>>, RpcError> {
        tokio::task::yield_now().await;
        self.check_reads()?;
        Ok(self.state().statuses.get(signature).cloned())
    }
}

/// Keypair-backed signer that can be told to decline.
#[derive(Clone)]
pub struct FakeWallet {
    keypair: Arc<Keypair>,
    reject: Arc<AtomicBool>,
    signed: Arc<AtomicUsize>,
}

impl Default for FakeWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWallet {
    pub fn new() -> Self {
        Self {
            keypair: Arc::new(Keypair::new()),
            reject: Arc::new(AtomicBool::new(false)),
            signed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for FakeWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(
        &self,
        mut tx: Transaction,
    ) -> Result<Transaction, WalletError> {
        tokio::task::yield_now().await;
        if self.reject.load(Ordering::SeqCst) {
            return Err(WalletError::Rejected);
        }
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[self.keypair.as_ref()], blockhash)
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(tx)
    }
}
