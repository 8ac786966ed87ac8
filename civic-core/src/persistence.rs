//! SQLite persistence for persona snapshots and the city event log.
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS personas (
//!     citizen_id    INTEGER PRIMARY KEY,
//!     household_tag TEXT NOT NULL,
//!     data          BLOB NOT NULL,
//!     updated_at    TEXT NOT NULL,
//!     checksum      TEXT
//! );
//! CREATE TABLE IF NOT EXISTS city_events (
//!     id          INTEGER PRIMARY KEY AUTOINCREMENT,
//!     event_date  TEXT NOT NULL,
//!     kind        TEXT NOT NULL,
//!     data        BLOB NOT NULL,
//!     recorded_at TEXT NOT NULL
//! );
//! ```
//!
//! The persona table is rewritten as a whole snapshot inside one
//! transaction; the event table is append-only. Rows that fail to decode
//! are skipped with a warning so a damaged save never stops a restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{CivicError, Result};
use crate::events::CityEvent;
use crate::population::PersonaRecord;

/// Store handle shared between the tick thread and conversation workers.
pub type SharedStore = Arc<Mutex<PersistenceEngine>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS personas (
        citizen_id    INTEGER PRIMARY KEY,
        household_tag TEXT NOT NULL,
        data          BLOB NOT NULL,
        updated_at    TEXT NOT NULL,
        checksum      TEXT
    );
    CREATE INDEX IF NOT EXISTS personas_by_household ON personas (household_tag);
    CREATE TABLE IF NOT EXISTS city_events (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        event_date  TEXT NOT NULL,
        kind        TEXT NOT NULL,
        data        BLOB NOT NULL,
        recorded_at TEXT NOT NULL
    );";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

/// Handle to the simulation's SQLite database.
pub struct PersistenceEngine {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns [`CivicError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags =
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Persistence engine opened");
        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`CivicError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Wrap the engine for sharing.
    #[must_use]
    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // ------------------------------------------------------------------
    // Persona snapshot
    // ------------------------------------------------------------------

    /// Replace the persona snapshot with `records`.
    ///
    /// # Errors
    /// Returns [`CivicError::Serialization`] or [`CivicError::Database`];
    /// on error the previous snapshot is left intact.
    pub fn save_personas(&mut self, records: &[PersonaRecord]) -> Result<usize> {
        let start = Instant::now();
        let now = Utc::now().to_rfc3339();
        let checksums = self.config.verify_checksums;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM personas", [])?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO personas (citizen_id, household_tag, data, updated_at, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                let json = serde_json::to_vec(record).map_err(|e| CivicError::Serialization(e.to_string()))?;
                let checksum = checksums.then(|| crc32_hex(&json));
                let id = i64::try_from(record.citizen.id.0)
                    .map_err(|_| CivicError::Serialization(format!("citizen id {} too large", record.citizen.id)))?;
                insert.execute(params![id, record.household_tag, json, now, checksum])?;
            }
        }
        tx.commit()?;

        debug!(
            personas = records.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved persona snapshot"
        );
        Ok(records.len())
    }

    /// Load every decodable persona record, ordered by citizen id.
    ///
    /// # Errors
    /// Returns [`CivicError::Database`] on SQLite failures.
    pub fn load_personas(&self) -> Result<Vec<PersonaRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT citizen_id, data, checksum FROM personas ORDER BY citizen_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, data, stored) = row?;
            if self.config.verify_checksums {
                if let Some(expected) = stored {
                    let actual = crc32_hex(&data);
                    if expected != actual {
                        warn!(citizen = id, %expected, %actual, "Checksum mismatch in persona row");
                    }
                }
            }
            match serde_json::from_slice::<PersonaRecord>(&data) {
                Ok(record) => records.push(record),
                Err(err) => warn!(citizen = id, %err, "Skipping undecodable persona row"),
            }
        }
        Ok(records)
    }

    /// Number of saved personas.
    ///
    /// # Errors
    /// Returns [`CivicError::Database`] on SQLite failures.
    pub fn persona_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM personas", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Event log
    // ------------------------------------------------------------------

    /// Append one entry to the event log.
    ///
    /// # Errors
    /// Returns [`CivicError::Serialization`] or [`CivicError::Database`].
    pub fn append_event(&self, event: &CityEvent) -> Result<()> {
        let json = serde_json::to_vec(event).map_err(|e| CivicError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO city_events (event_date, kind, data, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.date.to_string(),
                event.kind.as_str(),
                json,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Load the event log in insertion order, skipping undecodable rows.
    ///
    /// # Errors
    /// Returns [`CivicError::Database`] on SQLite failures.
    pub fn load_events(&self) -> Result<Vec<CityEvent>> {
        let mut stmt = self.conn.prepare_cached("SELECT id, data FROM city_events ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))?;

        let mut events = Vec::new();
        for row in rows {
            let (id, data) = row?;
            match serde_json::from_slice::<CityEvent>(&data) {
                Ok(event) => events.push(event),
                Err(err) => warn!(row = id, %err, "Skipping undecodable event row"),
            }
        }
        Ok(events)
    }

    /// Path of the database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

// ---------------------------------------------------------------------------
// Seed file
// ---------------------------------------------------------------------------

/// Read a JSON array of persona records, skipping malformed entries.
///
/// # Errors
/// Returns [`CivicError::Io`] if the file cannot be read, or
/// [`CivicError::Serialization`] if it is not a JSON array.
pub fn load_seed_file(path: &Path) -> Result<Vec<PersonaRecord>> {
    let text = std::fs::read_to_string(path)?;
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&text).map_err(|e| CivicError::Serialization(e.to_string()))?;

    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<PersonaRecord>(value) {
            Ok(record) => records.push(record),
            Err(err) => warn!(index, %err, file = %path.display(), "Skipping malformed seed record"),
        }
    }
    info!(records = records.len(), file = %path.display(), "Loaded persona seed file");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citizen::{AgeGroup, Citizen, CitizenId, EmploymentStatus, Gender, HouseholdId, Profession};
    use crate::events::EventKind;
    use crate::grid::TilePos;
    use crate::memory::Severity;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn record(id: u64, tag: &str) -> PersonaRecord {
        PersonaRecord {
            household_tag: tag.into(),
            citizen: Citizen {
                id: CitizenId(id),
                name: format!("Citizen {id}"),
                gender: Gender::Female,
                age_group: AgeGroup::Adult,
                employment: EmploymentStatus::Unemployed,
                profession: Profession::None,
                household: HouseholdId(1),
                home_tile: TilePos::new(2, 3),
                address: tag.into(),
                job_tile: None,
                schedule: None,
                temperament: "Calm".into(),
                values: vec!["family".into()],
                relationships: Vec::new(),
                memories: Vec::new(),
                traits: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn snapshot_replaces_previous_rows() {
        let mut store = PersistenceEngine::open_in_memory(&PersistenceConfig::default()).expect("open");
        store.save_personas(&[record(1, "A-000"), record(2, "A-000")]).expect("save");
        store.save_personas(&[record(3, "B-001")]).expect("save again");

        let loaded = store.load_personas().expect("load");
        assert_eq!(loaded, vec![record(3, "B-001")]);
        assert_eq!(store.persona_count().expect("count"), 1);
    }

    #[test]
    fn undecodable_rows_are_skipped() {
        let mut store = PersistenceEngine::open_in_memory(&PersistenceConfig::default()).expect("open");
        store.save_personas(&[record(1, "A-000")]).expect("save");
        store
            .conn
            .execute(
                "INSERT INTO personas (citizen_id, household_tag, data, updated_at, checksum)
                 VALUES (2, 'A-000', x'7b6e6f74206a736f6e', '2026-01-01', NULL)",
                [],
            )
            .expect("insert garbage");

        let loaded = store.load_personas().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].citizen.id, CitizenId(1));
    }

    #[test]
    fn events_append_in_order() {
        let store = PersistenceEngine::open_in_memory(&PersistenceConfig::default()).expect("open");
        for (day, kind) in [(3, EventKind::Fire), (8, EventKind::Fair)] {
            store
                .append_event(&CityEvent {
                    date: NaiveDate::from_ymd_opt(2026, 1, day).expect("valid date"),
                    kind,
                    description: format!("{} downtown", kind.as_str()),
                    severity: kind.severity(),
                    summary: "summary".into(),
                    narrative: "narrative".into(),
                })
                .expect("append");
        }
        let events = store.load_events().expect("load");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Fire);
        assert_eq!(events[1].severity, Severity::Low);
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("civic.db");
        {
            let mut store = PersistenceEngine::open(&path, &PersistenceConfig::default()).expect("open");
            store.save_personas(&[record(1, "C-002")]).expect("save");
        }
        let reopened = PersistenceEngine::open(&path, &PersistenceConfig::default()).expect("reopen");
        assert_eq!(reopened.load_personas().expect("load").len(), 1);
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn seed_file_tolerates_bad_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seed.json");
        let good = serde_json::to_value(record(4, "D-000")).expect("serialise");
        let text = serde_json::to_string(&vec![good, serde_json::json!({"name": 12})]).expect("serialise");
        std::fs::write(&path, text).expect("write seed");

        let records = load_seed_file(&path).expect("seed loads");
        assert_eq!(records, vec![record(4, "D-000")]);

        std::fs::write(&path, "{\"not\": \"an array\"}").expect("write seed");
        assert!(matches!(load_seed_file(&path), Err(CivicError::Serialization(_))));
    }

    #[test]
    fn crc32_matches_reference() {
        assert_eq!(crc32_hex(b"123456789"), "cbf43926");
    }
}
