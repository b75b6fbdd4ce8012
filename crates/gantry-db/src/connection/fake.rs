//! Scripted connection for engine tests.
//!
//! Every call is appended to a shared event log. Failures queued with
//! [`Script::fail_next`] are returned, one per statement, before any
//! statement succeeds. [`Script::fail_restore`] makes the next
//! `set_auto_commit(true)` fail after switching auto-commit back on, the way
//! a commit rejected by a deferred constraint does.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Connection, StatementHandle};
use crate::collection::RowCollection;
use crate::dialect::Backend;
use crate::errors::{DbError, Result};
use crate::statement::Statement;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Event {
    Open,
    Close,
    Execute(String, Vec<Value>),
    Query(String),
    Insert(String),
    AutoCommit(bool),
    Commit,
    Rollback,
}

#[derive(Clone, Default)]
pub(crate) struct Script {
    events: Arc<Mutex<Vec<Event>>>,
    failures: Arc<Mutex<VecDeque<DbError>>>,
    restore_failure: Arc<Mutex<Option<DbError>>>,
}

impl Script {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    /// Queue `n` failures produced by `make`.
    pub(crate) fn fail_next(&self, n: usize, make: fn() -> DbError) {
        let mut failures = self.failures.lock();
        for _ in 0..n {
            failures.push_back(make());
        }
    }

    /// Fail the next auto-commit restore with `make()`.
    pub(crate) fn fail_restore(&self, make: fn() -> DbError) {
        *self.restore_failure.lock() = Some(make());
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    fn take_failure(&self) -> Result<()> {
        self.failures.lock().pop_front().map_or(Ok(()), Err)
    }
}

pub(crate) struct FakeConnection {
    script: Script,
    open: bool,
    auto_commit: bool,
    fail_open: bool,
}

impl FakeConnection {
    pub(crate) fn new() -> (Self, Script) {
        let script = Script::default();
        let conn = Self {
            script: script.clone(),
            open: false,
            auto_commit: true,
            fail_open: false,
        };
        (conn, script)
    }

    pub(crate) fn unreachable() -> Self {
        let (mut conn, _) = Self::new();
        conn.fail_open = true;
        conn
    }
}

impl Connection for FakeConnection {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(DbError::Unavailable("connection refused".into()));
        }
        self.script.record(Event::Open);
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        self.script.record(Event::Close);
        self.open = false;
        Ok(())
    }

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn StatementHandle + 'c>> {
        Ok(Box::new(FakeStatement {
            script: &self.script,
            sql: sql.to_string(),
        }))
    }

    fn insert(&mut self, stmt: &Statement) -> Result<BTreeSet<i64>> {
        self.script.take_failure()?;
        self.script.record(Event::Insert(stmt.sql().to_string()));
        Ok(BTreeSet::from([1]))
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        self.script.record(Event::AutoCommit(enabled));
        self.auto_commit = enabled;
        if enabled {
            if let Some(e) = self.script.restore_failure.lock().take() {
                return Err(e);
            }
        }
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> Result<()> {
        self.script.record(Event::Commit);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.script.record(Event::Rollback);
        Ok(())
    }
}

struct FakeStatement<'c> {
    script: &'c Script,
    sql: String,
}

impl StatementHandle for FakeStatement<'_> {
    fn parameter_count(&self) -> usize {
        self.sql.matches('?').count()
    }

    fn execute(&mut self, params: &[Value]) -> Result<u64> {
        self.script.take_failure()?;
        self.script
            .record(Event::Execute(self.sql.clone(), params.to_vec()));
        Ok(1)
    }

    fn query(&mut self, _params: &[Value]) -> Result<RowCollection> {
        self.script.take_failure()?;
        self.script.record(Event::Query(self.sql.clone()));
        Ok(RowCollection::new(
            vec!["n".to_string()],
            vec![vec![Value::Integer(1)]],
        ))
    }
}
