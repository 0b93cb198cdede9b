//! Transaction boundaries.
//!
//! [`Transaction`] is a drop guard: it begins a transaction on creation and
//! rolls back when dropped without [`commit`](Transaction::commit), which
//! covers both early `?` returns and unwinding panics. A guard created while
//! the storage already has an open transaction joins it instead of nesting;
//! the outermost guard owns commit and rollback.

use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::Storage;

/// Guard over one transaction.
pub struct Transaction<'s> {
    storage: &'s dyn Storage,
    owned: bool,
    finished: bool,
}

impl<'s> Transaction<'s> {
    /// Begins a transaction, or joins the one already open.
    pub fn begin(storage: &'s dyn Storage) -> Result<Self> {
        let owned = !storage.in_transaction();
        if owned {
            storage.begin()?;
            debug!("transaction started");
        }
        Ok(Self {
            storage,
            owned,
            finished: false,
        })
    }

    pub fn storage(&self) -> &'s dyn Storage {
        self.storage
    }

    /// Whether this guard began the transaction.
    pub fn is_owner(&self) -> bool {
        self.owned
    }

    /// Commits if this guard owns the transaction.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        if self.owned {
            self.storage.commit()?;
            debug!("transaction committed");
        }
        Ok(())
    }

    /// Rolls back if this guard owns the transaction.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        if self.owned {
            self.storage.rollback()?;
            debug!("transaction rolled back");
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || !self.owned {
            return;
        }
        if let Err(err) = self.storage.rollback() {
            warn!(error = %err, "rollback after abandoned transaction failed");
        } else {
            debug!("transaction rolled back on drop");
        }
    }
}

/// Runs `body` inside a transaction, committing on `Ok` and rolling back on
/// `Err` or panic.
///
/// # Errors
///
/// Returns the body's error after rollback, or the commit error.
pub fn with_transaction<'s, T, F>(storage: &'s dyn Storage, body: F) -> Result<T>
where
    F: FnOnce(&'s dyn Storage) -> Result<T>,
{
    let tx = Transaction::begin(storage)?;
    match body(tx.storage()) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
