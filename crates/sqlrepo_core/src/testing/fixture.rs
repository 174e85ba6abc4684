//! Per-test scopes and per-run database fixtures.
//!
//! # Responsibility
//! - `TestScope`: one migrated connection wrapped in a `TestingTransaction`
//!   for the lifetime of a test.
//! - `DatabaseFixture`: run a create script once before a test run and the
//!   matching drop script when the fixture is dropped.

use super::transaction::{TestingTransaction, TransactionState, TxResult};
use crate::config::{DatabaseConfig, Resolution};
use crate::db::{open_with_config, DbResult, ScriptExecutor};
use log::{error, info};
use rusqlite::Connection;
use uuid::Uuid;

/// Connection plus transaction for one test body.
pub struct TestScope {
    transaction: TestingTransaction,
}

impl TestScope {
    /// Unit-test scope: everything the test writes is rolled back.
    pub fn unit(config: &DatabaseConfig) -> TxResult<Self> {
        Self::open(config, Resolution::RolledBack)
    }

    /// Integration-test scope: writes are committed unless rolled back
    /// explicitly.
    pub fn integration(config: &DatabaseConfig) -> TxResult<Self> {
        Self::open(config, Resolution::Committed)
    }

    /// Scope that resolves per `config.default_resolution`.
    pub fn from_config(config: &DatabaseConfig) -> TxResult<Self> {
        Self::open(config, config.default_resolution)
    }

    fn open(config: &DatabaseConfig, resolution: Resolution) -> TxResult<Self> {
        let conn = open_with_config(config)?;
        let transaction = TestingTransaction::begin_with(conn, resolution, config.transaction_mode)?;
        Ok(Self { transaction })
    }

    pub fn connection(&self) -> &Connection {
        self.transaction.connection()
    }

    pub fn transaction(&mut self) -> &mut TestingTransaction {
        &mut self.transaction
    }

    pub fn state(&self) -> TransactionState {
        self.transaction.state()
    }

    pub fn transaction_id(&self) -> Uuid {
        self.transaction.transaction_id()
    }

    /// Resolves the scope and returns its connection.
    pub fn finish(self) -> TxResult<Connection> {
        self.transaction.finish()
    }
}

/// Creates a database before a test run and drops it afterward.
pub struct DatabaseFixture {
    config: DatabaseConfig,
    executor: ScriptExecutor,
    drop_script: String,
}

impl DatabaseFixture {
    /// Runs `create_script` against `config` and remembers `drop_script` for
    /// teardown.
    pub fn setup(
        config: DatabaseConfig,
        create_script: &str,
        drop_script: impl Into<String>,
    ) -> DbResult<Self> {
        let executor = ScriptExecutor::new(&config);
        executor.run(create_script)?;
        info!(
            "event=fixture_setup module=testing status=ok database={}",
            config.database_name()
        );
        Ok(Self {
            config,
            executor,
            drop_script: drop_script.into(),
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Opens a rollback scope against the fixture database.
    pub fn unit_scope(&self) -> TxResult<TestScope> {
        TestScope::unit(&self.config)
    }

    pub fn integration_scope(&self) -> TxResult<TestScope> {
        TestScope::integration(&self.config)
    }
}

impl Drop for DatabaseFixture {
    fn drop(&mut self) {
        match self.executor.run(&self.drop_script) {
            Ok(_) => info!(
                "event=fixture_teardown module=testing status=ok database={}",
                self.config.database_name()
            ),
            Err(err) => error!(
                "event=fixture_teardown module=testing status=error database={} error={}",
                self.config.database_name(),
                err
            ),
        }
    }
}
