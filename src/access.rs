//! Service wiring.
//!
//! [`DataAccess`] owns the one connection provider of an application and
//! hands out executors and units of work bound to it.

use crate::config::{Config, ExecutionOptions};
use crate::db::{ConnectionProvider, ProcedureExecutor, UnitOfWork};
use crate::error::DbResult;
use crate::models::ConnectionSettings;
use std::sync::Arc;

/// Entry point for applications: one shared provider, cheap to clone.
#[derive(Debug, Clone)]
pub struct DataAccess {
    provider: Arc<ConnectionProvider>,
    options: ExecutionOptions,
}

impl DataAccess {
    pub fn new(settings: &ConnectionSettings, options: ExecutionOptions) -> DbResult<Self> {
        Ok(Self {
            provider: Arc::new(ConnectionProvider::new(settings)?),
            options,
        })
    }

    /// Resolve the connection from an environment variable.
    pub fn from_env(variable: &str, options: ExecutionOptions) -> DbResult<Self> {
        let settings = ConnectionSettings::from_env(variable)?;
        Self::new(&settings, options)
    }

    pub fn from_config(config: &Config) -> DbResult<Self> {
        Self::new(&config.connection_settings()?, config.execution_options()?)
    }

    /// Stateless executor for standalone calls.
    pub fn executor(&self) -> ProcedureExecutor {
        ProcedureExecutor::new(Arc::clone(&self.provider), &self.options)
    }

    /// A fresh unit of work; create one per logical operation.
    pub fn unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(Arc::clone(&self.provider), &self.options)
    }

    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub async fn close(&self) {
        self.provider.close().await;
    }
}
