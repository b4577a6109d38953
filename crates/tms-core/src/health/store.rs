//! Persistence for health-check rows (`agent_health_checks`)

use super::runner::HealthCheckResult;
use crate::error::HealthError;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Rows kept by `InMemoryHealthStore::new`
pub const DEFAULT_HEALTH_HISTORY: usize = 1_000;

/// Contract of the `agent_health_checks` table
#[async_trait::async_trait]
pub trait HealthStore: Send + Sync {
    /// `insert into agent_health_checks`
    async fn insert(&self, row: HealthCheckResult) -> Result<(), HealthError>;

    /// `select count(*) from agent_health_checks`
    async fn count(&self) -> Result<usize, HealthError>;

    /// `order by timestamp desc limit 1`, optionally filtered by agent type
    async fn latest(&self, agent_type: Option<&str>)
        -> Result<Option<HealthCheckResult>, HealthError>;
}

/// Process-local table holding the newest `capacity` rows
#[derive(Debug)]
pub struct InMemoryHealthStore {
    rows: RwLock<VecDeque<HealthCheckResult>>,
    capacity: usize,
}

impl InMemoryHealthStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HEALTH_HISTORY)
    }

    /// A capacity of 0 is raised to 1
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_HEALTH_HISTORY))),
            capacity,
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    #[must_use]
    pub fn rows(&self) -> Vec<HealthCheckResult> {
        self.rows.read().iter().cloned().collect()
    }
}

impl Default for InMemoryHealthStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HealthStore for InMemoryHealthStore {
    async fn insert(&self, row: HealthCheckResult) -> Result<(), HealthError> {
        let mut rows = self.rows.write();
        if rows.len() == self.capacity {
            rows.pop_front();
        }
        rows.push_back(row);
        Ok(())
    }

    async fn count(&self) -> Result<usize, HealthError> {
        Ok(self.rows.read().len())
    }

    async fn latest(
        &self,
        agent_type: Option<&str>,
    ) -> Result<Option<HealthCheckResult>, HealthError> {
        let rows = self.rows.read();
        Ok(rows
            .iter()
            .filter(|r| agent_type.map_or(true, |t| r.agent_type == t))
            .max_by_key(|r| r.timestamp)
            .cloned())
    }
}
