//! Database manager
//!
//! Holds the hosted-database connection settings and serves queries from a
//! local stub: every query succeeds with an empty row set after a fixed
//! latency. Issued statements are kept in a bounded history so callers can
//! inspect what would have reached the backend.

use crate::error::DatabaseError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tms_kernel::{ConfigError, DatabaseSettings, Environment, LogManager, LogScope, TmsConfig};

const QUERY_HISTORY_CAPACITY: usize = 256;

/// Connection settings for the hosted database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub project_id: Option<String>,
    pub region: Option<String>,
    /// A URL is mandatory when set
    pub require_url: bool,
    /// Simulated round-trip per query
    pub latency: Duration,
}

impl DatabaseConfig {
    /// Build from loaded settings; production requires a URL
    #[must_use]
    pub fn from_settings(settings: &DatabaseSettings, environment: Environment) -> Self {
        Self {
            url: settings.url.clone(),
            anon_key: settings.anon_key.clone(),
            project_id: settings.project_id.clone(),
            region: settings.region.clone(),
            require_url: environment == Environment::Production,
            latency: Duration::from_millis(settings.latency_ms),
        }
    }

    /// Read straight from the process environment
    ///
    /// # Errors
    /// Returns `ConfigError` for an unparseable `NODE_ENV`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = TmsConfig::from_lookup(|key| std::env::var(key).ok())?;
        Ok(Self::from_settings(&config.database, config.environment))
    }
}

/// Result of a stubbed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub data: Vec<Value>,
    pub row_count: usize,
}

impl QueryResult {
    fn empty() -> Self {
        Self {
            success: true,
            data: Vec::new(),
            row_count: 0,
        }
    }
}

/// A statement as it was handed to the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Stub database front-end
pub struct DatabaseManager {
    config: DatabaseConfig,
    connected: AtomicBool,
    connections: AtomicU64,
    history: Mutex<VecDeque<ExecutedQuery>>,
    log: LogScope,
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("url", &self.config.url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl DatabaseManager {
    #[must_use]
    pub fn new(config: DatabaseConfig, log: &Arc<LogManager>) -> Self {
        Self {
            config,
            connected: AtomicBool::new(false),
            connections: AtomicU64::new(0),
            history: Mutex::new(VecDeque::with_capacity(QUERY_HISTORY_CAPACITY)),
            log: log.scope("database"),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Open the (simulated) connection
    ///
    /// # Errors
    /// `DatabaseError::MissingConfig` when a URL is required and absent.
    pub async fn connect(&self) -> Result<(), DatabaseError> {
        if self.is_connected() {
            return Ok(());
        }
        match self.config.url.as_deref() {
            Some(url) => self.log.info(format!("Connecting to database at {url}")),
            None if self.config.require_url => {
                self.log.error("Database URL is not configured");
                return Err(DatabaseError::MissingConfig("SUPABASE_URL"));
            }
            None => self
                .log
                .warning("Database URL is not configured, using local stub"),
        }
        if self.config.anon_key.is_none() {
            self.log.debug("Database anon key is not configured");
        }

        tokio::time::sleep(self.config.latency).await;
        self.connected.store(true, Ordering::SeqCst);
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.log.success("Database connected");
        Ok(())
    }

    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.log.info("Database disconnected");
        }
    }

    /// Drop and re-open the connection
    ///
    /// # Errors
    /// Propagates `connect` failures.
    pub async fn reconnect(&self) -> Result<(), DatabaseError> {
        self.log.info("Reconnecting to database...");
        self.disconnect();
        self.connect().await
    }

    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of successful connects since construction
    #[must_use]
    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> bool {
        match self.execute_query("SELECT 1", &[]).await {
            Ok(result) => result.success,
            Err(e) => {
                self.log.warning(format!("Database health check failed: {e}"));
                false
            }
        }
    }

    /// Run a statement against the stub backend
    ///
    /// # Errors
    /// `DatabaseError::NotConnected` when called before `connect`.
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult, DatabaseError> {
        if !self.is_connected() {
            return Err(DatabaseError::NotConnected);
        }
        self.log.debug(format!("Executing query: {sql}"));
        tokio::time::sleep(self.config.latency).await;

        {
            let mut history = self.history.lock();
            if history.len() == QUERY_HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(ExecutedQuery {
                sql: sql.to_string(),
                params: params.to_vec(),
            });
        }
        metrics::counter!("tms_database_queries_total").increment(1);
        Ok(QueryResult::empty())
    }

    /// Most recent statements, oldest first
    #[must_use]
    pub fn executed_queries(&self) -> Vec<ExecutedQuery> {
        self.history.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager(config: DatabaseConfig) -> DatabaseManager {
        DatabaseManager::new(config, &LogManager::shared(100))
    }

    #[tokio::test(start_paused = true)]
    async fn query_before_connect_fails() {
        let db = manager(DatabaseConfig::default());
        let err = db.execute_query("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotConnected));
        assert!(!db.health_check().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stub_query_returns_empty_rows() {
        let db = manager(DatabaseConfig::default());
        db.connect().await.unwrap();

        let result = db
            .execute_query(
                "SELECT * FROM portal_management WHERE portal_key = $1",
                &[json!("carrier")],
            )
            .await
            .unwrap();
        assert_eq!(result, QueryResult::empty());

        let history = db.executed_queries();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].params, vec![json!("carrier")]);
    }

    #[tokio::test(start_paused = true)]
    async fn production_requires_url() {
        let settings = DatabaseSettings::default();
        let db = manager(DatabaseConfig::from_settings(&settings, Environment::Production));
        assert!(matches!(
            db.connect().await,
            Err(DatabaseError::MissingConfig(_))
        ));
        assert!(!db.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_counts_connections() {
        let db = manager(DatabaseConfig {
            url: Some("https://db.example.test".into()),
            ..DatabaseConfig::default()
        });
        db.connect().await.unwrap();
        db.connect().await.unwrap();
        assert_eq!(db.connection_count(), 1);

        db.reconnect().await.unwrap();
        assert!(db.is_connected());
        assert_eq!(db.connection_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_bounded() {
        let db = manager(DatabaseConfig::default());
        db.connect().await.unwrap();
        for i in 0..QUERY_HISTORY_CAPACITY + 5 {
            db.execute_query(&format!("SELECT {i}"), &[]).await.unwrap();
        }
        let history = db.executed_queries();
        assert_eq!(history.len(), QUERY_HISTORY_CAPACITY);
        assert_eq!(history[0].sql, "SELECT 5");
    }
}
