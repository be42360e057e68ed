use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::plate::PlateKind;

/// Store-assigned record identity.
pub type RecordId = i64;

/// Durable record of one recognized plate. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlateRecord {
    pub plate: String,
    pub kind: PlateKind,
    pub recorded_at: DateTime<Local>,
    pub plate_image_path: String,
    pub full_image_path: String,
    pub ocr_confidence: f32,
}

/// Append-only record store shared by every session.
///
/// Implementations synchronise internally; sessions call `append`
/// concurrently.
pub trait PlateStore: Send + Sync {
    /// Cheap round trip proving the store is reachable.
    fn probe(&self) -> Result<()>;

    fn append(&self, record: &PlateRecord) -> Result<RecordId>;

    fn count(&self) -> Result<u64>;
}

pub struct SqlitePlateStore {
    conn: Mutex<Connection>,
}

impl SqlitePlateStore {
    /// Open (or create) the database and probe it.
    ///
    /// `file:` URIs are opened with URI semantics so tests can use shared
    /// in-memory databases.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)
            .with_context(|| format!("failed to open plate store {}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        store.probe()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("plate store lock poisoned"))
    }

    fn ensure_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS plate_records (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              plate TEXT NOT NULL,
              kind TEXT NOT NULL,
              recorded_at TEXT NOT NULL,
              plate_image_path TEXT NOT NULL,
              full_image_path TEXT NOT NULL,
              ocr_confidence REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_plate_records_plate ON plate_records(plate);
            "#,
        )?;
        Ok(())
    }
}

impl PlateStore for SqlitePlateStore {
    fn probe(&self) -> Result<()> {
        let one: i64 = self
            .conn()?
            .query_row("SELECT 1", [], |row| row.get(0))
            .context("plate store probe failed")?;
        if one != 1 {
            return Err(anyhow!("plate store probe returned {}", one));
        }
        Ok(())
    }

    fn append(&self, record: &PlateRecord) -> Result<RecordId> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO plate_records(plate, kind, recorded_at, plate_image_path, full_image_path, ocr_confidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.plate,
                record.kind.as_str(),
                record.recorded_at.to_rfc3339(),
                record.plate_image_path,
                record.full_image_path,
                f64::from(record.ocr_confidence),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM plate_records", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

/// Volatile store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryPlateStore {
    records: Mutex<Vec<PlateRecord>>,
}

impl InMemoryPlateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, in order.
    pub fn records(&self) -> Vec<PlateRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl PlateStore for InMemoryPlateStore {
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn append(&self, record: &PlateRecord) -> Result<RecordId> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        records.push(record.clone());
        Ok(records.len() as RecordId)
    }

    fn count(&self) -> Result<u64> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(records.len() as u64)
    }
}
