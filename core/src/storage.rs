//! The storage capability the core runs against.
//!
//! Connection handling and wire transport live outside this crate; a
//! backend only needs to execute statements, run queries and delimit
//! transactions. `tabula-sqlite` provides the SQLite implementation.

use crate::error::Result;
use crate::types::{Row, Value};

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Key generated by the statement, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// Minimal interface to a relational backend.
///
/// Methods take `&self`; implementations that wrap a single connection use
/// interior mutability or rely on the driver's own.
pub trait Storage {
    /// Executes one statement with positional arguments.
    fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome>;

    /// Runs a query and returns all rows.
    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    /// Executes a script that may hold several statements and no arguments.
    fn execute_script(&self, sql: &str) -> Result<()> {
        self.execute(sql, &[]).map(|_| ())
    }

    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    /// Whether a transaction is currently open on this storage.
    fn in_transaction(&self) -> bool {
        false
    }
}

impl<S: Storage + ?Sized> Storage for &S {
    fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome> {
        (**self).execute(sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, args)
    }

    fn execute_script(&self, sql: &str) -> Result<()> {
        (**self).execute_script(sql)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }
}

#[cfg(test)]
pub(crate) mod recording {
    //! In-memory [`Storage`] that records every call, for exact-SQL tests.

    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::error::Error;

    #[derive(Debug, Default)]
    pub struct RecordingStorage {
        pub log: RefCell<Vec<(String, Vec<Value>)>>,
        pub results: RefCell<VecDeque<Vec<Row>>>,
        pub outcomes: RefCell<VecDeque<ExecOutcome>>,
        pub fail_on: RefCell<Option<String>>,
        pub open: RefCell<bool>,
    }

    impl RecordingStorage {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues rows for the next query.
        pub fn push_rows(&self, rows: Vec<Row>) {
            self.results.borrow_mut().push_back(rows);
        }

        /// Queues the outcome of the next execute.
        pub fn push_outcome(&self, rows_affected: u64, last_insert_id: Option<i64>) {
            self.outcomes.borrow_mut().push_back(ExecOutcome {
                rows_affected,
                last_insert_id,
            });
        }

        /// Fails any statement containing `needle`.
        pub fn fail_when(&self, needle: &str) {
            *self.fail_on.borrow_mut() = Some(needle.to_string());
        }

        pub fn statements(&self) -> Vec<String> {
            self.log.borrow().iter().map(|(s, _)| s.clone()).collect()
        }

        pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
            self.log.borrow().clone()
        }

        fn record(&self, sql: &str, args: &[Value]) -> Result<()> {
            self.log.borrow_mut().push((sql.to_string(), args.to_vec()));
            if let Some(needle) = self.fail_on.borrow().as_deref() {
                if sql.contains(needle) {
                    return Err(Error::Usage(format!("forced failure on {needle}")));
                }
            }
            Ok(())
        }
    }

    impl Storage for RecordingStorage {
        fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome> {
            self.record(sql, args)?;
            Ok(self.outcomes.borrow_mut().pop_front().unwrap_or(ExecOutcome {
                rows_affected: 1,
                last_insert_id: None,
            }))
        }

        fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
            self.record(sql, args)?;
            Ok(self.results.borrow_mut().pop_front().unwrap_or_default())
        }

        fn begin(&self) -> Result<()> {
            self.record("BEGIN", &[])?;
            *self.open.borrow_mut() = true;
            Ok(())
        }

        fn commit(&self) -> Result<()> {
            self.record("COMMIT", &[])?;
            *self.open.borrow_mut() = false;
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            self.record("ROLLBACK", &[])?;
            *self.open.borrow_mut() = false;
            Ok(())
        }

        fn in_transaction(&self) -> bool {
            *self.open.borrow()
        }
    }
}
