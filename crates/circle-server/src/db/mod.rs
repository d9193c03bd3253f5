//! Database module for Circle Server
//!
//! A thin layer over libSQL:
//! - local file or in-memory databases
//! - versioned schema migrations
//! - health checks
//!
//! libSQL gives every `:memory:` connection its own empty database, so an
//! in-memory [`Database`] keeps one persistent connection and hands out guards
//! to it. File-based databases open a fresh connection per call.

mod migrations;

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use libsql::{Connection, Database as LibSqlDatabase};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

pub use migrations::{Migration, MigrationRunner};

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Internal database error: {0}")]
    Internal(#[from] libsql::Error),
}

/// Wrapper around a libsql database
#[derive(Clone)]
pub struct Database {
    db: Arc<LibSqlDatabase>,
    name: String,
    persistent: Option<Arc<Mutex<Connection>>>,
}

impl Database {
    /// Create a new in-memory database
    #[instrument(skip_all, fields(name = %name))]
    pub async fn in_memory(name: &str) -> Result<Self, DatabaseError> {
        debug!("Creating in-memory database: {}", name);
        let db = libsql::Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        Ok(Self {
            db: Arc::new(db),
            name: name.to_string(),
            persistent: Some(Arc::new(Mutex::new(conn))),
        })
    }

    /// Create or open a local file-based database
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open_local(name: &str, path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        debug!("Opening local database '{}' at: {:?}", name, path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                ))
            })?;
        }

        let db = libsql::Builder::new_local(path).build().await?;

        info!("Opened database '{}' at {:?}", name, path);
        Ok(Self {
            db: Arc::new(db),
            name: name.to_string(),
            persistent: None,
        })
    }

    /// Open the database at `path`, or an in-memory one if `path` is `None`.
    pub async fn open(name: &str, path: Option<&str>) -> Result<Self, DatabaseError> {
        match path {
            Some(path) => Self::open_local(name, path).await,
            None => Self::in_memory(name).await,
        }
    }

    /// Get a connection to the database.
    ///
    /// For in-memory databases this waits for the shared persistent connection.
    pub async fn connection(&self) -> Result<ConnectionGuard<'_>, DatabaseError> {
        match &self.persistent {
            Some(persistent) => Ok(ConnectionGuard::Persistent(persistent.lock().await)),
            None => Ok(ConnectionGuard::Owned(self.db.connect()?)),
        }
    }

    /// Get the database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this database lives only in memory
    pub fn is_in_memory(&self) -> bool {
        self.persistent.is_some()
    }

    /// Check if the database is healthy by executing a simple query
    #[instrument(skip_all, fields(name = %self.name))]
    pub async fn health_check(&self) -> Result<bool, DatabaseError> {
        let conn = self.connection().await?;
        match conn.query("SELECT 1", ()).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Database health check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Execute a single statement without parameters
    #[instrument(skip_all, fields(name = %self.name))]
    pub async fn execute(&self, sql: &str) -> Result<u64, DatabaseError> {
        let conn = self.connection().await?;
        Ok(conn.execute(sql, ()).await?)
    }
}

/// A connection borrowed from a [`Database`].
pub enum ConnectionGuard<'a> {
    /// Guard on the persistent connection of an in-memory database
    Persistent(MutexGuard<'a, Connection>),
    /// Owned connection for file-based databases
    Owned(Connection),
}

impl Deref for ConnectionGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            ConnectionGuard::Persistent(guard) => guard,
            ConnectionGuard::Owned(conn) => conn,
        }
    }
}
