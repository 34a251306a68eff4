use crate::error::TxError;
use solana_sdk::pubkey::Pubkey;
use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

/// Busy flags for sessions with a mutating operation in flight.
#[derive(Clone, Default)]
pub struct SessionLocks {
    busy: Arc<Mutex<HashSet<Pubkey>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session, or fail with `Busy` if something already holds it.
    /// Requests are rejected, never queued.
    pub fn try_acquire(&self, session: Pubkey) -> Result<SessionGuard, TxError> {
        let mut busy = self.busy_set();
        if !busy.insert(session) {
            return Err(TxError::Busy);
        }
        Ok(SessionGuard {
            locks: self.clone(),
            session,
        })
    }

    pub fn is_locked(&self, session: &Pubkey) -> bool {
        self.busy_set().contains(session)
    }

    fn release(&self, session: &Pubkey) {
        self.busy_set().remove(session);
    }

    // the set stays valid even if a holder panicked mid-update
    fn busy_set(&self) -> MutexGuard<'_, HashSet<Pubkey>> {
        self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the session on drop, on every exit path.
pub struct SessionGuard {
    locks: SessionLocks,
    session: Pubkey,
}

impl SessionGuard {
    pub fn session(&self) -> Pubkey {
        self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.locks.release(&self.session);
    }
}
