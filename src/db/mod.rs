pub mod schema;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::watchlist::{ListKind, ListedAddress};

/// A persisted fraud alert from the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudAlertRecord {
    pub id: i64,
    pub subject_id: String,
    pub kind: String,
    pub risk_score: f64,
    pub risk_level: String,
    pub flags: Vec<String>,
    pub blocked: bool,
    pub status: String,
    pub created_at: String,
}

pub struct Database {
    conn: Connection,
}

/// Thread-safe wrapper around Database.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let db = Database::open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
        })
    }

    /// Record a scored analysis in the audit log.
    pub fn store_alert(
        &self,
        subject_id: &str,
        kind: &str,
        risk_score: f64,
        risk_level: &str,
        flags: &[String],
        blocked: bool,
    ) -> Result<(), rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.store_alert(subject_id, kind, risk_score, risk_level, flags, blocked)
    }

    /// Get recent alerts ordered by time.
    pub fn recent_alerts(&self, limit: usize) -> Result<Vec<FraudAlertRecord>, rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.recent_alerts(limit)
    }

    /// Get alerts with score above threshold.
    pub fn alerts_above_score(
        &self,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<FraudAlertRecord>, rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.alerts_above_score(min_score, limit)
    }

    /// Get total alert count.
    pub fn alert_count(&self) -> Result<usize, rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.alert_count()
    }

    /// Move an alert through its review lifecycle. Returns false when the
    /// alert does not exist.
    pub fn set_alert_status(&self, id: i64, status: &str) -> Result<bool, rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.set_alert_status(id, status)
    }

    /// Insert or replace a watchlist entry.
    pub fn upsert_watchlist(&self, entry: &ListedAddress) -> Result<(), rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.upsert_watchlist(entry)
    }

    /// Remove an address from the watchlist. Returns false when absent.
    pub fn remove_watchlist(&self, address: &str) -> Result<bool, rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.remove_watchlist(address)
    }

    /// Load all watchlist entries.
    pub fn watchlist_entries(&self) -> Result<Vec<ListedAddress>, rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.watchlist_entries()
    }

    /// Bulk-load watchlist entries from a CSV file.
    pub fn load_watchlist_from_csv(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let db = self.inner.lock().unwrap();
        db.load_watchlist_from_csv(path)
    }

    /// Store a ticket's metadata document.
    pub fn put_metadata(&self, token_id: u64, json: &str) -> Result<(), rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.put_metadata(token_id, json)
    }

    /// Fetch a ticket's stored metadata document.
    pub fn get_metadata(&self, token_id: u64) -> Result<Option<String>, rusqlite::Error> {
        let db = self.inner.lock().unwrap();
        db.get_metadata(token_id)
    }
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn store_alert(
        &self,
        subject_id: &str,
        kind: &str,
        risk_score: f64,
        risk_level: &str,
        flags: &[String],
        blocked: bool,
    ) -> Result<(), rusqlite::Error> {
        let flags_json = serde_json::to_string(flags).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO fraud_alerts (subject_id, kind, risk_score, risk_level, flags, blocked, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', datetime('now'))",
            rusqlite::params![subject_id, kind, risk_score, risk_level, flags_json, blocked as i32],
        )?;
        Ok(())
    }

    fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<FraudAlertRecord> {
        let flags_json: Option<String> = row.get(5)?;
        let blocked: i32 = row.get(6)?;
        Ok(FraudAlertRecord {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            kind: row.get(2)?,
            risk_score: row.get(3)?,
            risk_level: row.get(4)?,
            flags: flags_json
                .as_deref()
                .and_then(|json| serde_json::from_str(json).ok())
                .unwrap_or_default(),
            blocked: blocked != 0,
            status: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub fn recent_alerts(&self, limit: usize) -> Result<Vec<FraudAlertRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, kind, risk_score, risk_level, flags, blocked, status, created_at
             FROM fraud_alerts ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], Self::row_to_alert)?;
        rows.collect()
    }

    pub fn alerts_above_score(
        &self,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<FraudAlertRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, kind, risk_score, risk_level, flags, blocked, status, created_at
             FROM fraud_alerts WHERE risk_score >= ?1 ORDER BY risk_score DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![min_score, limit as i64], Self::row_to_alert)?;
        rows.collect()
    }

    pub fn alert_count(&self) -> Result<usize, rusqlite::Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM fraud_alerts", [], |row| {
                row.get::<_, i64>(0).map(|c| c as usize)
            })
    }

    pub fn set_alert_status(&self, id: i64, status: &str) -> Result<bool, rusqlite::Error> {
        let updated = self.conn.execute(
            "UPDATE fraud_alerts SET status = ?1 WHERE id = ?2",
            rusqlite::params![status, id],
        )?;
        Ok(updated > 0)
    }

    pub fn upsert_watchlist(&self, entry: &ListedAddress) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO watchlist (address, kind, reason, added_at)
             VALUES (?1, ?2, ?3, datetime('now'))",
            rusqlite::params![entry.address, entry.kind.as_str(), entry.reason],
        )?;
        Ok(())
    }

    pub fn remove_watchlist(&self, address: &str) -> Result<bool, rusqlite::Error> {
        let removed = self.conn.execute(
            "DELETE FROM watchlist WHERE address = ?1",
            rusqlite::params![address.to_lowercase()],
        )?;
        Ok(removed > 0)
    }

    pub fn watchlist_entries(&self) -> Result<Vec<ListedAddress>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT address, kind, reason FROM watchlist")?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(1)?;
            Ok(ListedAddress {
                address: row.get(0)?,
                kind: ListKind::parse(&kind).unwrap_or(ListKind::Blocked),
                reason: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// CSV columns: address, kind, reason (header row skipped).
    pub fn load_watchlist_from_csv(&self, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let mut count = 0;
        for line in content.lines().skip(1) {
            let parts: Vec<&str> = line.splitn(3, ',').collect();
            if parts.len() < 2 {
                continue;
            }
            let Some(kind) = ListKind::parse(parts[1].trim()) else {
                continue;
            };
            let entry = ListedAddress::new(
                parts[0].trim(),
                kind,
                parts.get(2).map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            );
            self.upsert_watchlist(&entry)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn put_metadata(&self, token_id: u64, json: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata_docs (token_id, json, updated_at)
             VALUES (?1, ?2, datetime('now'))",
            rusqlite::params![token_id as i64, json],
        )?;
        Ok(())
    }

    pub fn get_metadata(&self, token_id: u64) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT json FROM metadata_docs WHERE token_id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![token_id as i64])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn open_temp_db() -> SharedDatabase {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "eventxx_test_{}_{}.db",
            std::process::id(),
            id
        ));
        // Remove if leftover from previous run
        let _ = std::fs::remove_file(&path);
        SharedDatabase::open(&path).unwrap()
    }

    fn flags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn store_and_query_alerts() {
        let db = open_temp_db();
        db.store_alert("transfer_1", "transfer", 0.9, "CRITICAL", &flags(&["Blacklisted address involved"]), true)
            .unwrap();
        db.store_alert("event_2", "event", 0.4, "LOW", &flags(&["Incomplete event information"]), false)
            .unwrap();

        let recent = db.recent_alerts(10).unwrap();
        assert_eq!(recent.len(), 2);
        // newest first
        assert_eq!(recent[0].subject_id, "event_2");
        assert_eq!(recent[1].flags, vec!["Blacklisted address involved".to_string()]);
        assert!(recent[1].blocked);
        assert_eq!(recent[1].status, "active");

        assert_eq!(db.alert_count().unwrap(), 2);
    }

    #[test]
    fn alerts_above_score_filters() {
        let db = open_temp_db();
        db.store_alert("t1", "transfer", 0.95, "CRITICAL", &flags(&["Circular trading pattern"]), true)
            .unwrap();
        db.store_alert("t2", "transfer", 0.35, "LOW", &flags(&["Rapid consecutive transfers"]), false)
            .unwrap();

        let high = db.alerts_above_score(0.8, 10).unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].subject_id, "t1");
    }

    #[test]
    fn alert_count_empty() {
        let db = open_temp_db();
        assert_eq!(db.alert_count().unwrap(), 0);
    }

    #[test]
    fn alert_status_update() {
        let db = open_temp_db();
        db.store_alert("t1", "transfer", 0.5, "LOW", &[], false).unwrap();
        let id = db.recent_alerts(1).unwrap()[0].id;

        assert!(db.set_alert_status(id, "investigating").unwrap());
        assert_eq!(db.recent_alerts(1).unwrap()[0].status, "investigating");
        assert!(!db.set_alert_status(9999, "resolved").unwrap());
    }

    #[test]
    fn empty_flags_round_trip() {
        let db = open_temp_db();
        db.store_alert("t1", "transfer", 0.0, "LOW", &[], false).unwrap();
        let record = &db.recent_alerts(1).unwrap()[0];
        assert!(record.flags.is_empty());
        assert!(!record.blocked);
    }

    #[test]
    fn watchlist_roundtrip() {
        let db = open_temp_db();
        let entry = ListedAddress::new(
            "0xABC0000000000000000000000000000000000001",
            ListKind::Blocked,
            Some("chargeback ring".to_string()),
        );
        db.upsert_watchlist(&entry).unwrap();

        let entries = db.watchlist_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "0xabc0000000000000000000000000000000000001");
        assert_eq!(entries[0].kind, ListKind::Blocked);
        assert_eq!(entries[0].reason.as_deref(), Some("chargeback ring"));
    }

    #[test]
    fn watchlist_remove() {
        let db = open_temp_db();
        let entry = ListedAddress::new("0xabc0000000000000000000000000000000000001", ListKind::Trusted, None);
        db.upsert_watchlist(&entry).unwrap();

        assert!(db.remove_watchlist("0xABC0000000000000000000000000000000000001").unwrap());
        assert!(!db.remove_watchlist("0xabc0000000000000000000000000000000000001").unwrap());
        assert!(db.watchlist_entries().unwrap().is_empty());
    }

    #[test]
    fn watchlist_upsert_replaces_kind() {
        let db = open_temp_db();
        let addr = "0xabc0000000000000000000000000000000000001";
        db.upsert_watchlist(&ListedAddress::new(addr, ListKind::Trusted, None)).unwrap();
        db.upsert_watchlist(&ListedAddress::new(addr, ListKind::Blocked, None)).unwrap();

        let entries = db.watchlist_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ListKind::Blocked);
    }

    #[test]
    fn watchlist_csv_import() {
        let db = open_temp_db();
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let csv_path = std::env::temp_dir().join(format!(
            "eventxx_watchlist_{}_{}.csv",
            std::process::id(),
            id
        ));
        std::fs::write(
            &csv_path,
            "address,kind,reason\n\
             0xAAA0000000000000000000000000000000000001,blocked,scalper bot\n\
             0xAAA0000000000000000000000000000000000002,trusted,\n\
             malformed-line\n\
             0xAAA0000000000000000000000000000000000003,unknown,ignored\n",
        )
        .unwrap();

        let count = db.load_watchlist_from_csv(&csv_path).unwrap();
        assert_eq!(count, 2);
        let entries = db.watchlist_entries().unwrap();
        assert_eq!(entries.len(), 2);
        let _ = std::fs::remove_file(&csv_path);
    }

    #[test]
    fn metadata_roundtrip() {
        let db = open_temp_db();
        assert!(db.get_metadata(1).unwrap().is_none());

        db.put_metadata(1, r#"{"name":"Tech Conference 2024 - Ticket #1"}"#).unwrap();
        let stored = db.get_metadata(1).unwrap().unwrap();
        assert!(stored.contains("Ticket #1"));

        db.put_metadata(1, r#"{"name":"updated"}"#).unwrap();
        assert_eq!(db.get_metadata(1).unwrap().unwrap(), r#"{"name":"updated"}"#);
    }
}
