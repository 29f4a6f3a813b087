//! Unit of work: one transaction spanning several procedure calls.
//!
//! A [`UnitOfWork`] holds at most one transaction. `execute` on an idle unit
//! runs as a standalone call: it begins a transaction, commits on success and
//! rolls back on failure. After an explicit `begin_transaction`, every execute
//! reuses the open transaction and only `commit`/`rollback` finish it.
//!
//! A `begin_transaction` while a transaction is already open joins it as an
//! external caller: no second transaction is opened, and the matching
//! `commit` or `rollback` only unwinds that nesting level. The owner alone
//! decides whether the physical transaction commits.
//!
//! ```ignore
//! let mut uow = access.unit_of_work();
//! uow.begin_transaction(&cancel).await?;
//! let mut insert = Command::new("usp_Person_Insert")
//!     .with_param("Name", "Jane")
//!     .with_output("PersonId");
//! uow.execute::<Scalar>(&mut insert, &cancel).await?;
//! let id: i64 = insert.output("PersonId")?.unwrap_or_default();
//! uow.commit(&cancel).await?;
//! ```

use crate::config::ExecutionOptions;
use crate::db::guard::guarded;
use crate::db::procedure::{self, CallMode, CommandOutput};
use crate::db::provider::{ConnectionProvider, DbTransaction};
use crate::error::{DbError, DbResult};
use crate::mapping::{MultiShape, ResultShape, RowMapper, ShapeKind};
use crate::models::{Command, ResultReader};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Observable state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfWorkState {
    Idle,
    /// This unit began the open transaction
    OwnedTransaction,
    /// The open transaction was joined by a nested `begin_transaction`
    ExternalTransaction,
    Disposed,
}

struct ActiveTransaction {
    transaction: DbTransaction,
    nested: usize,
    started_at: Instant,
}

enum TxSlot {
    Idle,
    Active(ActiveTransaction),
    Disposed,
}

pub struct UnitOfWork {
    id: String,
    provider: Arc<ConnectionProvider>,
    mapper: RowMapper,
    default_timeout: Duration,
    slot: TxSlot,
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("mapper", &self.mapper)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl UnitOfWork {
    pub fn new(provider: Arc<ConnectionProvider>, options: &ExecutionOptions) -> Self {
        Self {
            id: format!("uow_{}", Uuid::new_v4().simple()),
            provider,
            mapper: RowMapper::new(options.mapping),
            default_timeout: options.command_timeout,
            slot: TxSlot::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> UnitOfWorkState {
        match &self.slot {
            TxSlot::Idle => UnitOfWorkState::Idle,
            TxSlot::Active(active) if active.nested > 0 => UnitOfWorkState::ExternalTransaction,
            TxSlot::Active(_) => UnitOfWorkState::OwnedTransaction,
            TxSlot::Disposed => UnitOfWorkState::Disposed,
        }
    }

    pub fn has_active_transaction(&self) -> bool {
        matches!(self.slot, TxSlot::Active(_))
    }

    fn ensure_usable(&self) -> DbResult<()> {
        match self.slot {
            TxSlot::Disposed => Err(DbError::Disposed),
            _ => Ok(()),
        }
    }

    fn take_active(&mut self) -> Option<ActiveTransaction> {
        match std::mem::replace(&mut self.slot, TxSlot::Idle) {
            TxSlot::Active(active) => Some(active),
            other => {
                self.slot = other;
                None
            }
        }
    }

    /// Begin a transaction, or join the one already open.
    pub async fn begin_transaction(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        self.ensure_usable()?;

        if let TxSlot::Active(active) = &mut self.slot {
            active.nested += 1;
            debug!(
                unit_of_work = %self.id,
                depth = active.nested,
                "Joined active transaction"
            );
            return Ok(());
        }

        let transaction = self.provider.begin(cancel).await?;
        self.slot = TxSlot::Active(ActiveTransaction {
            transaction,
            nested: 0,
            started_at: Instant::now(),
        });
        debug!(unit_of_work = %self.id, "Transaction begun");
        Ok(())
    }

    /// Run a command and read its selected result set with shape `S`.
    pub async fn execute<S: ResultShape>(
        &mut self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> DbResult<S::Output> {
        self.ensure_usable()?;
        command.validate()?;
        let index = command.checked_result_set_index()?;

        let mode = if S::KIND == ShapeKind::Scalar && index == 0 {
            CallMode::Scalar
        } else {
            CallMode::Reader
        };
        let mapper = self.mapper;
        self.run(command, mode, Some(index), cancel, |output, name| {
            let mut reader = ResultReader::new(name, output.result_sets);
            reader.advance_to(index)?;
            S::read(&mapper, &mut reader)
        })
        .await
    }

    /// Run a command and read consecutive result sets, starting at the first.
    pub async fn execute_multiple<M: MultiShape>(
        &mut self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> DbResult<M::Output> {
        self.ensure_usable()?;
        command.validate()?;

        let mapper = self.mapper;
        self.run(command, CallMode::Reader, None, cancel, |output, name| {
            let mut reader = ResultReader::new(name, output.result_sets);
            M::read(&mapper, &mut reader)
        })
        .await
    }

    async fn run<T, F>(
        &mut self,
        command: &mut Command,
        mode: CallMode,
        result_set_index: Option<usize>,
        cancel: &CancellationToken,
        read: F,
    ) -> DbResult<T>
    where
        F: FnOnce(CommandOutput, &str) -> DbResult<T>,
    {
        let name = command.procedure().to_string();
        let standalone = !self.has_active_transaction();
        if standalone {
            self.begin_transaction(cancel).await?;
        }

        let mut outcome = match self.call_active(command, mode, cancel).await {
            Ok(output) => {
                command.apply_outputs(output.outputs.clone());
                read(output, &name)
            }
            Err(e) => Err(e),
        };

        if standalone {
            outcome = match outcome {
                Ok(value) => self.commit(cancel).await.map(|()| value),
                Err(e) => {
                    self.rollback().await;
                    Err(e)
                }
            };
        }

        outcome.map_err(|e| {
            error!(
                unit_of_work = %self.id,
                procedure = %name,
                result_set_index = ?result_set_index,
                error = %e,
                "Stored procedure failed"
            );
            e.in_procedure(&name, result_set_index)
        })
    }

    async fn call_active(
        &mut self,
        command: &Command,
        mode: CallMode,
        cancel: &CancellationToken,
    ) -> DbResult<CommandOutput> {
        let limit = command.timeout().unwrap_or(self.default_timeout);
        let TxSlot::Active(active) = &mut self.slot else {
            return Err(DbError::transaction("No active transaction"));
        };
        guarded(
            "procedure execution",
            cancel,
            Some(limit),
            procedure::call(active.transaction.as_conn(), command, mode),
        )
        .await
    }

    /// Commit the open transaction, or unwind one nesting level.
    ///
    /// The unit is idle afterwards whatever the outcome of the physical commit.
    pub async fn commit(&mut self, cancel: &CancellationToken) -> DbResult<()> {
        match &mut self.slot {
            TxSlot::Disposed => return Err(DbError::Disposed),
            TxSlot::Idle => {
                return Err(DbError::transaction("No active transaction to commit"));
            }
            TxSlot::Active(active) if active.nested > 0 => {
                active.nested -= 1;
                debug!(
                    unit_of_work = %self.id,
                    depth = active.nested,
                    "Nested commit deferred to transaction owner"
                );
                return Ok(());
            }
            TxSlot::Active(_) => {}
        }

        let Some(active) = self.take_active() else {
            return Err(DbError::transaction("No active transaction to commit"));
        };
        let elapsed_ms = active.started_at.elapsed().as_millis() as u64;

        guarded(
            "transaction commit",
            cancel,
            None,
            active.transaction.commit(),
        )
        .await
        .inspect_err(|e| error!(unit_of_work = %self.id, error = %e, "Commit failed"))?;

        info!(unit_of_work = %self.id, elapsed_ms, "Transaction committed");
        Ok(())
    }

    /// Roll back the open transaction, or unwind one nesting level.
    ///
    /// Never fails: with nothing to roll back a warning is logged, and driver
    /// errors during rollback are logged and swallowed.
    pub async fn rollback(&mut self) {
        match &mut self.slot {
            TxSlot::Idle | TxSlot::Disposed => {
                warn!(unit_of_work = %self.id, "Rollback requested with no active transaction");
                return;
            }
            TxSlot::Active(active) if active.nested > 0 => {
                active.nested -= 1;
                debug!(
                    unit_of_work = %self.id,
                    depth = active.nested,
                    "Nested rollback deferred to transaction owner"
                );
                return;
            }
            TxSlot::Active(_) => {}
        }

        if let Some(active) = self.take_active() {
            match active.transaction.rollback().await {
                Ok(()) => info!(unit_of_work = %self.id, "Transaction rolled back"),
                Err(e) => error!(unit_of_work = %self.id, error = %e, "Rollback failed"),
            }
        }
    }

    /// Roll back anything still open and refuse further work. Idempotent.
    pub async fn dispose(&mut self) {
        if matches!(self.slot, TxSlot::Disposed) {
            return;
        }
        // joined levels share the one physical transaction, so it is rolled back
        // whatever the nesting depth
        if let Some(active) = self.take_active() {
            warn!(
                unit_of_work = %self.id,
                depth = active.nested,
                "Disposing unit of work with an active transaction; rolling back"
            );
            if let Err(e) = active.transaction.rollback().await {
                error!(unit_of_work = %self.id, error = %e, "Rollback on dispose failed");
            }
        }
        self.slot = TxSlot::Disposed;
        debug!(unit_of_work = %self.id, "Unit of work disposed");
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if let TxSlot::Active(active) = &self.slot {
            // the sqlx transaction rolls back when its connection returns to the pool
            warn!(
                unit_of_work = %self.id,
                started_ms_ago = active.started_at.elapsed().as_millis() as u64,
                "Unit of work dropped with an active transaction"
            );
        }
    }
}
