//! SQLite-backed store.
//!
//! Embeddings are stored as little-endian f32 blobs next to their dimension.
//! Vendor baselines hold `(n, mean, m2)` only; derived statistics are never
//! written.

use super::{HistorySnapshot, InvoiceStore};
use crate::error::{Result, StoreError};
use crate::scoring::vendor_stats::{welford_step, VendorObservation, VendorStats};
use crate::types::{EmbeddingEntry, InvoiceEmbedding, InvoiceFields, InvoiceRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS invoices (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  vendor_name TEXT,
  invoice_number TEXT,
  invoice_date TEXT,
  total_amount REAL,
  currency TEXT,
  source_file TEXT,
  raw_text TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS invoice_embeddings (
  invoice_id INTEGER NOT NULL,
  model_name TEXT NOT NULL,
  dim INTEGER NOT NULL,
  embedding BLOB NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY (invoice_id, model_name),
  FOREIGN KEY (invoice_id) REFERENCES invoices(id)
);

CREATE TABLE IF NOT EXISTS vendor_amount_stats (
  vendor_name TEXT PRIMARY KEY,
  n INTEGER NOT NULL,
  mean REAL NOT NULL,
  m2 REAL NOT NULL
);
";

const INVOICE_COLUMNS: &str = "id, vendor_name, invoice_number, invoice_date, total_amount, \
                               currency, source_file, raw_text, created_at";

/// Store backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at the provided path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "SQLite store opened");
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", 1)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl InvoiceStore for SqliteStore {
    fn snapshot(&self, vendor_key: Option<&str>, model_name: &str) -> Result<HistorySnapshot> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let snapshot = HistorySnapshot {
            invoices: query_invoices(&tx)?,
            embeddings: query_embeddings(&tx, model_name)?,
            vendor_stats: match vendor_key {
                Some(key) => query_vendor_stats(&tx, key)?,
                None => None,
            },
        };

        tx.commit()?;
        Ok(snapshot)
    }

    fn invoices(&self) -> Result<Vec<InvoiceRecord>> {
        let conn = self.conn.lock()?;
        query_invoices(&conn)
    }

    fn commit_invoice(
        &self,
        fields: &InvoiceFields,
        embedding: Option<&InvoiceEmbedding>,
        observation: Option<&VendorObservation>,
    ) -> Result<InvoiceRecord> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let created_at = Utc::now();

        tx.execute(
            "INSERT INTO invoices (
                vendor_name, invoice_number, invoice_date, total_amount,
                currency, source_file, raw_text, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                fields.vendor_name,
                fields.invoice_number,
                fields.invoice_date,
                fields.total_amount.filter(|a| a.is_finite()),
                fields.currency,
                fields.source_file,
                fields.raw_text,
                created_at.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        if let Some(embedding) = embedding {
            upsert_embedding_row(&tx, id, &embedding.model_name, &embedding.vector)?;
        }
        if let Some(obs) = observation {
            apply_observation(&tx, &obs.vendor_key, obs.amount)?;
        }
        tx.commit()?;

        debug!(invoice_id = id, "Invoice persisted");
        Ok(InvoiceRecord::from_fields(id, fields, created_at))
    }

    fn upsert_embedding(&self, entry: &EmbeddingEntry) -> Result<()> {
        let conn = self.conn.lock()?;
        upsert_embedding_row(&conn, entry.invoice_id, &entry.model_name, &entry.vector)
    }

    fn embeddings(&self, model_name: &str) -> Result<Vec<EmbeddingEntry>> {
        let conn = self.conn.lock()?;
        query_embeddings(&conn, model_name)
    }

    fn vendor_stats(&self, vendor_key: &str) -> Result<Option<VendorStats>> {
        let conn = self.conn.lock()?;
        query_vendor_stats(&conn, vendor_key)
    }

    fn update_vendor_stats(&self, vendor_key: &str, amount: f64) -> Result<VendorStats> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = apply_observation(&tx, vendor_key, amount)?;
        tx.commit()?;
        Ok(updated)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

type InvoiceRow = (InvoiceRecord, String);

fn upsert_embedding_row(conn: &Connection, invoice_id: i64, model_name: &str, vector: &[f32]) -> Result<()> {
    let dim = i64::try_from(vector.len())
        .map_err(|_| StoreError::InvalidDbValue("embedding dimension overflow".to_string()))?;

    conn.execute(
        "INSERT INTO invoice_embeddings (invoice_id, model_name, dim, embedding, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(invoice_id, model_name) DO UPDATE SET
            dim = excluded.dim,
            embedding = excluded.embedding,
            created_at = excluded.created_at",
        params![
            invoice_id,
            model_name,
            dim,
            encode_f32_blob(vector),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Read-modify-write of one vendor baseline. Callers hold an IMMEDIATE transaction.
fn apply_observation(conn: &Connection, vendor_key: &str, amount: f64) -> Result<VendorStats> {
    let current = query_vendor_stats(conn, vendor_key)?;
    let updated = welford_step(current.as_ref(), vendor_key, amount);
    let n = i64::try_from(updated.n)
        .map_err(|_| StoreError::InvalidDbValue("vendor sample count overflow".to_string()))?;

    conn.execute(
        "INSERT INTO vendor_amount_stats (vendor_name, n, mean, m2)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(vendor_name) DO UPDATE SET
            n = excluded.n,
            mean = excluded.mean,
            m2 = excluded.m2",
        params![vendor_key, n, updated.mean, updated.m2],
    )?;
    Ok(updated)
}

fn query_invoices(conn: &Connection) -> Result<Vec<InvoiceRecord>> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], decode_invoice_row)?;

    let mut invoices = Vec::new();
    for row in rows {
        invoices.push(finish_invoice(row?)?);
    }
    Ok(invoices)
}

fn query_embeddings(conn: &Connection, model_name: &str) -> Result<Vec<EmbeddingEntry>> {
    let mut stmt = conn.prepare(
        "SELECT invoice_id, dim, embedding
         FROM invoice_embeddings
         WHERE model_name = ?1
         ORDER BY invoice_id ASC",
    )?;
    let rows = stmt.query_map(params![model_name], |row| {
        let invoice_id: i64 = row.get(0)?;
        let dim: i64 = row.get(1)?;
        let blob: Vec<u8> = row.get(2)?;
        Ok((invoice_id, dim, blob))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (invoice_id, dim, blob) = row?;
        let vector = decode_f32_blob(&blob);
        if usize::try_from(dim).ok() != Some(vector.len()) {
            warn!(
                invoice_id,
                stored_dim = dim,
                decoded_dim = vector.len(),
                "Stored embedding dimension disagrees with blob length"
            );
        }
        entries.push(EmbeddingEntry {
            invoice_id,
            model_name: model_name.to_string(),
            dim: vector.len(),
            vector,
        });
    }
    Ok(entries)
}

fn query_vendor_stats(conn: &Connection, vendor_key: &str) -> Result<Option<VendorStats>> {
    let row = conn
        .query_row(
            "SELECT vendor_name, n, mean, m2 FROM vendor_amount_stats WHERE vendor_name = ?1",
            params![vendor_key],
            |row| {
                let vendor_name: String = row.get(0)?;
                let n: i64 = row.get(1)?;
                let mean: f64 = row.get(2)?;
                let m2: f64 = row.get(3)?;
                Ok((vendor_name, n, mean, m2))
            },
        )
        .optional()?;

    let Some((vendor_name, n, mean, m2)) = row else {
        return Ok(None);
    };
    let n = u64::try_from(n)
        .map_err(|_| StoreError::InvalidDbValue(format!("negative sample count {n}")))?;

    Ok(Some(VendorStats {
        vendor_name,
        n,
        mean,
        m2,
    }))
}

fn decode_invoice_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvoiceRow> {
    let record = InvoiceRecord {
        id: row.get(0)?,
        vendor_name: row.get(1)?,
        invoice_number: row.get(2)?,
        invoice_date: row.get(3)?,
        total_amount: row.get(4)?,
        currency: row.get(5)?,
        source_file: row.get(6)?,
        raw_text: row.get(7)?,
        created_at: DateTime::<Utc>::MIN_UTC,
    };
    let created_at: String = row.get(8)?;
    Ok((record, created_at))
}

fn finish_invoice((mut record, created_at): InvoiceRow) -> Result<InvoiceRecord> {
    record.created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StoreError::InvalidDbValue(format!("created_at {created_at:?}: {e}")))?
        .with_timezone(&Utc);
    Ok(record)
}

fn encode_f32_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode as many whole f32 values as the blob holds
fn decode_f32_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
