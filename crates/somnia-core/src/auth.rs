//! Forced logout on rejected credentials.
//!
//! The HTTP layer is external; it reports response statuses here. The
//! capability to log the user out is handed in at construction rather than
//! looked up from shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::flags::{self, DailyFlag};
use crate::notify::{NotificationIdRegistry, WAKE_UP_REMINDER};
use crate::session::SESSION_KEY;
use crate::storage::KvStore;

/// Something that can end the user's authenticated session.
pub trait ForceLogout {
    fn force_logout(&self);
}

impl<F: Fn()> ForceLogout for F {
    fn force_logout(&self) {
        self()
    }
}

pub struct SessionGuard<'a> {
    logout: &'a dyn ForceLogout,
    store: &'a dyn KvStore,
    reminders: NotificationIdRegistry<'a>,
    tripped: AtomicBool,
}

impl<'a> SessionGuard<'a> {
    pub fn new(
        logout: &'a dyn ForceLogout,
        store: &'a dyn KvStore,
        reminders: NotificationIdRegistry<'a>,
    ) -> Self {
        Self {
            logout,
            store,
            reminders,
            tripped: AtomicBool::new(false),
        }
    }

    /// Feed a response status. Returns `true` if it triggered a logout.
    ///
    /// Only the first 401 logs out; later ones are ignored until [`rearm`](Self::rearm).
    pub fn observe_status(&self, status: u16) -> bool {
        if status != 401 {
            return false;
        }
        if self.tripped.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("credentials rejected, forcing logout");
        self.clear_local_state();
        self.logout.force_logout();
        true
    }

    /// Allow the next 401 to log out again, e.g. after a fresh sign-in.
    pub fn rearm(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Per-user local state must not leak into the next account.
    fn clear_local_state(&self) {
        for flag in DailyFlag::ALL {
            let key = flags::storage_key(flag.key());
            if let Err(e) = self.store.remove(&key) {
                warn!(key, error = %e, "failed to clear daily flag on logout");
            }
        }
        if let Err(e) = self.store.remove(SESSION_KEY) {
            warn!(error = %e, "failed to clear sleep session on logout");
        }
        self.reminders.cancel(WAKE_UP_REMINDER);
    }
}
