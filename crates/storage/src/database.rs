//! SQLite database handle.

use std::path::{Path, PathBuf};

use policy::{CapabilityKind, CapabilityRequest, Decision, Policy};
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{Batch, Connection, OpenFlags, types::Value};
use tracing::debug;

use crate::{Error, QueryOutput, Result};

/// A single long-lived connection to a pre-existing SQLite file.
///
/// Statements run in autocommit mode, so each one is its own transaction.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
    policy: Policy,
}

impl Database {
    /// Open an existing database file.
    ///
    /// The file is never created. When `policy` refuses writes the file is
    /// opened read-only as well.
    pub fn open(path: impl AsRef<Path>, policy: Policy) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let mode = if policy.is_read_only() {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        let conn = Connection::open_with_flags(
            path,
            mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            policy,
        })
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory(policy: Policy) -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
            policy,
        })
    }

    /// Path of the backing file, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run exactly one SQL statement and collect every row it produces.
    ///
    /// The statement is compiled first, classified with SQLite's own
    /// read-only test and checked against the policy before it is stepped.
    /// Rows are returned untransformed, in the order the engine yields them.
    pub fn query(&self, sql: &str) -> Result<QueryOutput> {
        let mut batch = Batch::new(&self.conn, sql);
        let Some(mut stmt) = batch.next()? else {
            return Err(Error::Statement("no SQL statement provided".into()));
        };
        if batch.next()?.is_some() {
            return Err(Error::Statement(
                "only one statement can be executed at a time".into(),
            ));
        }

        let kind = if stmt.readonly() {
            CapabilityKind::SqlRead
        } else {
            CapabilityKind::SqlWrite
        };
        if let Decision::Deny { reason } =
            self.policy.check(&CapabilityRequest::with_scope(kind, sql))
        {
            return Err(Error::Denied(reason));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.push(values);
        }

        debug!(%kind, columns = width, rows = rows.len(), "statement executed");

        Ok(QueryOutput { columns, rows })
    }
}
