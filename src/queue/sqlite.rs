//! SQLite-backed deferred store.
//!
//! Table: `deferred_requests`, one row per queued request, keyed by
//! `request_id`, with an autoincrement `seq` that breaks creation-time ties.

use crate::config::StoreConfig;
use crate::gatekeeper::decision::Tier;
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::record::{QueueRecord, QueueStatus, RecordStatus};
use crate::queue::DeferredStore;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// Default wait on a locked database before reporting it unavailable.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const COLUMNS: &str = "seq, request_id, payload, gate_decision, submitter_id, tier, status,
     created_at, claimed_at, processed_at, result, error";

/// Select-and-mark in one statement. The inner SELECT picks the oldest pending
/// rows; the outer `status = 'pending'` guard keeps the update conditional.
const CLAIM_SQL: &str = "UPDATE deferred_requests
     SET status = 'processing', claimed_at = ?1
     WHERE seq IN (
         SELECT seq FROM deferred_requests
         WHERE status = 'pending' AND (?2 IS NULL OR tier = ?2)
         ORDER BY created_at ASC, seq ASC
         LIMIT ?3
     )
     AND status = 'pending'
     RETURNING seq, request_id, payload, gate_decision, submitter_id, tier, status,
               created_at, claimed_at, processed_at, result, error";

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(request_id: &str, raw: &str) -> QueueResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::Corrupt {
            request_id: request_id.to_string(),
            message: format!("bad timestamp '{raw}': {e}"),
        })
}

/// Row as stored, before decoding enums and timestamps.
struct RawRow {
    seq: i64,
    request_id: String,
    payload: String,
    gate_decision: String,
    submitter_id: String,
    tier: String,
    status: String,
    created_at: String,
    claimed_at: Option<String>,
    processed_at: Option<String>,
    result: Option<String>,
    error: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            request_id: row.get(1)?,
            payload: row.get(2)?,
            gate_decision: row.get(3)?,
            submitter_id: row.get(4)?,
            tier: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            claimed_at: row.get(8)?,
            processed_at: row.get(9)?,
            result: row.get(10)?,
            error: row.get(11)?,
        })
    }

    fn into_record(self) -> QueueResult<(i64, QueueRecord)> {
        let corrupt = |message: String| QueueError::Corrupt {
            request_id: self.request_id.clone(),
            message,
        };
        let tier = Tier::parse(&self.tier).ok_or_else(|| corrupt(format!("unknown tier '{}'", self.tier)))?;
        let status = RecordStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?;
        let created_at = parse_ts(&self.request_id, &self.created_at)?;
        let claimed_at = self
            .claimed_at
            .as_deref()
            .map(|s| parse_ts(&self.request_id, s))
            .transpose()?;
        let processed_at = self
            .processed_at
            .as_deref()
            .map(|s| parse_ts(&self.request_id, s))
            .transpose()?;

        Ok((
            self.seq,
            QueueRecord {
                request_id: self.request_id,
                payload: self.payload,
                gate_decision: self.gate_decision,
                submitter_id: self.submitter_id,
                tier,
                status,
                created_at,
                claimed_at,
                processed_at,
                result: self.result,
                error: self.error,
            },
        ))
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// Durable deferred store on a single SQLite file.
///
/// One connection per instance, serialized by a mutex. Several instances (in
/// one process or many) may share the same file; SQLite's write lock plus the
/// busy timeout serialize their writes.
pub struct SqliteDeferredStore {
    conn: Mutex<Connection>,
}

impl SqliteDeferredStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path) -> QueueResult<Self> {
        Self::open_with_timeout(db_path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }

    pub fn from_config(config: &StoreConfig) -> QueueResult<Self> {
        Self::open_with_timeout(&config.db_path, Duration::from_millis(config.busy_timeout_ms))
    }

    pub fn open_with_timeout(db_path: &Path, busy_timeout: Duration) -> QueueResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(busy_timeout)?;

        // WAL for concurrent readers; FULL sync so an acknowledged push is on disk.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = FULL;",
        )?;
        Self::init_schema(&conn)?;

        tracing::debug!(path = %db_path.display(), "Deferred store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Non-durable store for tests and dry runs.
    pub fn open_in_memory() -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> QueueResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS deferred_requests (
                seq           INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id    TEXT NOT NULL UNIQUE,
                payload       TEXT NOT NULL,
                gate_decision TEXT NOT NULL,
                submitter_id  TEXT NOT NULL,
                tier          TEXT NOT NULL,
                status        TEXT NOT NULL DEFAULT 'pending'
                              CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
                created_at    TEXT NOT NULL,
                claimed_at    TEXT,
                processed_at  TEXT,
                result        TEXT,
                error         TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_deferred_claim
                ON deferred_requests(status, tier, created_at, seq);",
        )?;
        Ok(())
    }

    /// processing → `to`, or explain why not.
    fn finish(
        &self,
        request_id: &str,
        to: RecordStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> QueueResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE deferred_requests
             SET status = ?2, processed_at = ?3, result = ?4, error = ?5
             WHERE request_id = ?1 AND status = 'processing'",
            params![request_id, to.as_str(), ts(&Utc::now()), result, error],
        )?;
        if changed == 1 {
            return Ok(());
        }

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM deferred_requests WHERE request_id = ?1",
                params![request_id],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            None => Err(QueueError::NotFound(request_id.to_string())),
            Some(raw) => match RecordStatus::parse(&raw) {
                Some(from) => Err(QueueError::InvalidTransition {
                    request_id: request_id.to_string(),
                    from,
                    to,
                }),
                None => Err(QueueError::Corrupt {
                    request_id: request_id.to_string(),
                    message: format!("unknown status '{raw}'"),
                }),
            },
        }
    }

    fn query_records(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::types::ToSql],
    ) -> QueueResult<Vec<QueueRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            let (_, record) = row?.into_record()?;
            records.push(record);
        }
        Ok(records)
    }

    #[cfg(test)]
    fn set_read_only(&self) {
        self.conn.lock().execute_batch("PRAGMA query_only = ON;").unwrap();
    }
}

impl DeferredStore for SqliteDeferredStore {
    fn push(&self, record: &QueueRecord) -> QueueResult<()> {
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO deferred_requests
                (request_id, payload, gate_decision, submitter_id, tier, status,
                 created_at, claimed_at, processed_at, result, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.request_id,
                record.payload,
                record.gate_decision,
                record.submitter_id,
                record.tier.as_str(),
                record.status.as_str(),
                ts(&record.created_at),
                record.claimed_at.as_ref().map(ts),
                record.processed_at.as_ref().map(ts),
                record.result,
                record.error,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(QueueError::DuplicateKey(record.request_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn claim(&self, limit: usize, tier: Option<Tier>) -> QueueResult<Vec<QueueRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let conn = self.conn.lock();
        let now = ts(&Utc::now());
        // Every matched row is already `processing` once the statement runs,
        // so all of them are read back before any is decoded.
        let raw: Vec<RawRow> = {
            let mut stmt = conn.prepare(CLAIM_SQL)?;
            let rows = stmt.query_map(
                params![now, tier.map(Tier::as_str), limit],
                RawRow::from_row,
            )?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut claimed = Vec::with_capacity(raw.len());
        for row in raw {
            let seq = row.seq;
            match row.into_record() {
                Ok(decoded) => claimed.push(decoded),
                // Undecodable rows never reach a worker; fail them here so
                // they still get a terminal status.
                Err(err) => {
                    tracing::warn!(seq, "claimed undecodable record, marking failed: {err}");
                    if let Err(e) = conn.execute(
                        "UPDATE deferred_requests
                         SET status = 'failed', processed_at = ?2, error = ?3
                         WHERE seq = ?1 AND status = 'processing'",
                        params![seq, now, err.to_string()],
                    ) {
                        tracing::error!(seq, "failed to mark undecodable record: {e}");
                    }
                }
            }
        }
        // RETURNING order is unspecified; restore creation order.
        claimed.sort_by(|(a_seq, a), (b_seq, b)| a.created_at.cmp(&b.created_at).then(a_seq.cmp(b_seq)));
        Ok(claimed.into_iter().map(|(_, record)| record).collect())
    }

    fn complete(&self, request_id: &str, result: &str) -> QueueResult<()> {
        self.finish(request_id, RecordStatus::Completed, Some(result), None)
    }

    fn fail(&self, request_id: &str, error: &str) -> QueueResult<()> {
        self.finish(request_id, RecordStatus::Failed, None, Some(error))
    }

    fn status(&self) -> QueueResult<QueueStatus> {
        let conn = self.conn.lock();
        // One grouped query: every count comes from the same snapshot.
        let mut stmt = conn.prepare(
            "SELECT tier, status, COUNT(*) FROM deferred_requests GROUP BY tier, status",
        )?;
        let groups = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut status = QueueStatus::default();
        for group in groups {
            let (tier, raw_status, count) = group?;
            let parsed = RecordStatus::parse(&raw_status).ok_or_else(|| QueueError::Corrupt {
                request_id: "*".into(),
                message: format!("unknown status '{raw_status}'"),
            })?;
            status.add(&tier, parsed, u64::try_from(count).unwrap_or(0));
        }
        Ok(status)
    }

    fn get(&self, request_id: &str) -> QueueResult<Option<QueueRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM deferred_requests WHERE request_id = ?1");
        Ok(self.query_records(&sql, &[&request_id])?.into_iter().next())
    }

    fn stranded(&self, older_than: Duration) -> QueueResult<Vec<QueueRecord>> {
        let age = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now().checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let sql = format!(
            "SELECT {COLUMNS} FROM deferred_requests
             WHERE status = 'processing' AND claimed_at <= ?1
             ORDER BY claimed_at ASC, seq ASC"
        );
        self.query_records(&sql, &[&ts(&cutoff)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::decision::GateDecision;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_store(tmp: &TempDir) -> SqliteDeferredStore {
        SqliteDeferredStore::open(&tmp.path().join("queue").join("deferred.db")).unwrap()
    }

    fn make_record(id: &str, tier: Tier) -> QueueRecord {
        let decision = GateDecision::tiered(tier, "batch processing", "ENQUEUE");
        QueueRecord::pending(id, format!("export report {id}"), &decision, "tester", tier)
    }

    fn ids(records: &[QueueRecord]) -> Vec<&str> {
        records.iter().map(|r| r.request_id.as_str()).collect()
    }

    #[test]
    fn claim_on_empty_store_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        assert!(store.claim(1, None).unwrap().is_empty());
        assert!(store.claim(10, Some(Tier::Low)).unwrap().is_empty());
    }

    #[test]
    fn claim_marks_processing_so_second_claim_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.push(&make_record("r1", Tier::Low)).unwrap();

        let first = store.claim(1, None).unwrap();
        assert_eq!(ids(&first), vec!["r1"]);
        assert_eq!(first[0].status, RecordStatus::Processing);
        assert!(first[0].claimed_at.is_some());

        assert!(store.claim(1, None).unwrap().is_empty());
    }

    #[test]
    fn claim_zero_limit_claims_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.push(&make_record("r1", Tier::Low)).unwrap();
        assert!(store.claim(0, None).unwrap().is_empty());
        assert_eq!(store.status().unwrap().pending, 1);
    }

    #[test]
    fn undecodable_row_is_failed_and_good_rows_still_returned() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.push(&make_record("good", Tier::Low)).unwrap();
        store.push(&make_record("bad", Tier::Low)).unwrap();
        store
            .conn
            .lock()
            .execute(
                "UPDATE deferred_requests SET tier = 'lowish' WHERE request_id = 'bad'",
                [],
            )
            .unwrap();

        let claimed = store.claim(10, None).unwrap();
        assert_eq!(ids(&claimed), vec!["good"]);

        let status = store.status().unwrap();
        assert_eq!(status.processing, 1);
        assert_eq!(status.failed, 1);
        assert_eq!(status.pending, 0);

        store.complete("good", "ok").unwrap();
        assert_eq!(store.status().unwrap().processing, 0);
    }

    #[test]
    fn duplicate_push_is_rejected_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.push(&make_record("dup", Tier::Low)).unwrap();

        let mut other = make_record("dup", Tier::Low);
        other.payload = "different payload".into();
        let err = store.push(&other).unwrap_err();
        assert!(matches!(err, QueueError::DuplicateKey(ref id) if id == "dup"));

        assert_eq!(store.get("dup").unwrap().unwrap().payload, "export report dup");
        assert_eq!(store.status().unwrap().total, 1);
    }

    #[test]
    fn claim_is_fifo_by_creation_time() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let base = Utc::now();
        // Pushed out of order; created_at decides.
        for (id, offset) in [("c", 3), ("a", 1), ("b", 2)] {
            let mut r = make_record(id, Tier::Low);
            r.created_at = base + chrono::Duration::seconds(offset);
            store.push(&r).unwrap();
        }

        assert_eq!(ids(&store.claim(2, None).unwrap()), vec!["a", "b"]);
        assert_eq!(ids(&store.claim(2, None).unwrap()), vec!["c"]);
    }

    #[test]
    fn equal_timestamps_fall_back_to_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let at = Utc::now();
        for id in ["first", "second", "third"] {
            let mut r = make_record(id, Tier::Low);
            r.created_at = at;
            store.push(&r).unwrap();
        }
        assert_eq!(ids(&store.claim(3, None).unwrap()), vec!["first", "second", "third"]);
    }

    #[test]
    fn tier_filter_claims_only_that_tier_in_order() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let base = Utc::now();
        for (i, (id, tier)) in [("l1", Tier::Low), ("h1", Tier::High), ("l2", Tier::Low), ("h2", Tier::High)]
            .into_iter()
            .enumerate()
        {
            let mut r = make_record(id, tier);
            r.created_at = base + chrono::Duration::milliseconds(i as i64);
            store.push(&r).unwrap();
        }

        assert_eq!(ids(&store.claim(10, Some(Tier::High)).unwrap()), vec!["h1", "h2"]);
        assert_eq!(ids(&store.claim(10, None).unwrap()), vec!["l1", "l2"]);
    }

    #[test]
    fn complete_and_fail_are_terminal() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.push(&make_record("ok", Tier::Low)).unwrap();
        store.push(&make_record("bad", Tier::Low)).unwrap();

        // Pending records cannot jump straight to a terminal status.
        assert!(matches!(
            store.complete("ok", "done"),
            Err(QueueError::InvalidTransition { from: RecordStatus::Pending, .. })
        ));

        store.claim(2, None).unwrap();
        store.complete("ok", "{\"answer\":42}").unwrap();
        store.fail("bad", "engine exploded").unwrap();

        let ok = store.get("ok").unwrap().unwrap();
        assert_eq!(ok.status, RecordStatus::Completed);
        assert_eq!(ok.result.as_deref(), Some("{\"answer\":42}"));
        assert!(ok.processed_at.is_some());
        assert!(ok.error.is_none());

        let bad = store.get("bad").unwrap().unwrap();
        assert_eq!(bad.status, RecordStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("engine exploded"));

        // No completed → failed, failed → completed, or double completion.
        assert!(matches!(
            store.fail("ok", "late"),
            Err(QueueError::InvalidTransition { from: RecordStatus::Completed, to: RecordStatus::Failed, .. })
        ));
        assert!(matches!(
            store.complete("bad", "late"),
            Err(QueueError::InvalidTransition { from: RecordStatus::Failed, .. })
        ));
        assert!(matches!(store.complete("ok", "again"), Err(QueueError::InvalidTransition { .. })));

        // Terminal records are never claimed again.
        assert!(store.claim(10, None).unwrap().is_empty());
    }

    #[test]
    fn finishing_unknown_id_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        assert!(matches!(store.complete("ghost", "x"), Err(QueueError::NotFound(_))));
        assert!(matches!(store.fail("ghost", "x"), Err(QueueError::NotFound(_))));
    }

    #[test]
    fn status_counts_always_sum_to_total() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        assert_eq!(store.status().unwrap(), QueueStatus::default());

        for i in 0..12 {
            let tier = if i % 3 == 0 { Tier::High } else { Tier::Low };
            store.push(&make_record(&format!("r{i}"), tier)).unwrap();
            assert!(store.status().unwrap().is_consistent());
        }

        let batch = store.claim(7, None).unwrap();
        assert!(store.status().unwrap().is_consistent());
        for (i, r) in batch.iter().enumerate() {
            if i % 2 == 0 {
                store.complete(&r.request_id, "ok").unwrap();
            } else {
                store.fail(&r.request_id, "nope").unwrap();
            }
            assert!(store.status().unwrap().is_consistent());
        }

        let status = store.status().unwrap();
        assert_eq!(status.total, 12);
        assert_eq!(status.pending, 5);
        assert_eq!(status.processing, 0);
        assert_eq!(status.completed, 4);
        assert_eq!(status.failed, 3);
        let tier_sum: u64 = status.by_tier.values().flat_map(|m| m.values()).sum();
        assert_eq!(tier_sum, status.total);
        assert_eq!(status.by_tier["HIGH"].values().sum::<u64>(), 4);
    }

    #[test]
    fn reopen_preserves_records_and_status() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deferred.db");

        let (before_status, before_records) = {
            let store = SqliteDeferredStore::open(&path).unwrap();
            for i in 0..5 {
                store.push(&make_record(&format!("r{i}"), Tier::Low)).unwrap();
            }
            let claimed = store.claim(3, None).unwrap();
            store.complete(&claimed[0].request_id, "done").unwrap();
            store.fail(&claimed[1].request_id, "boom").unwrap();

            let records: Vec<QueueRecord> = (0..5)
                .map(|i| store.get(&format!("r{i}")).unwrap().unwrap())
                .collect();
            (store.status().unwrap(), records)
        };

        let reopened = SqliteDeferredStore::open(&path).unwrap();
        assert_eq!(reopened.status().unwrap(), before_status);
        for before in &before_records {
            let after = reopened.get(&before.request_id).unwrap().unwrap();
            assert_eq!(&after, before);
        }
        assert_eq!(before_status.processing, 1);
    }

    #[test]
    fn concurrent_claimers_never_share_a_record() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deferred.db");
        {
            let store = SqliteDeferredStore::open(&path).unwrap();
            for i in 0..200 {
                store.push(&make_record(&format!("r{i:03}"), Tier::Low)).unwrap();
            }
        }

        // Half the claimers share one handle, half open their own connection.
        let shared = Arc::new(SqliteDeferredStore::open(&path).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let shared = Arc::clone(&shared);
                let path = path.clone();
                std::thread::spawn(move || {
                    let own;
                    let store: &SqliteDeferredStore = if n % 2 == 0 {
                        &shared
                    } else {
                        own = SqliteDeferredStore::open(&path).unwrap();
                        &own
                    };
                    let mut mine = Vec::new();
                    loop {
                        let batch = store.claim(7, None).unwrap();
                        if batch.is_empty() {
                            break;
                        }
                        mine.extend(batch.into_iter().map(|r| r.request_id));
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.join().unwrap() {
                total += 1;
                assert!(seen.insert(id.clone()), "record {id} claimed twice");
            }
        }
        assert_eq!(total, 200);
        assert_eq!(shared.status().unwrap().processing, 200);
    }

    #[test]
    fn unwritable_medium_is_storage_unavailable() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.set_read_only();

        let err = store.push(&make_record("r1", Tier::Low)).unwrap_err();
        assert!(matches!(err, QueueError::StorageUnavailable(_)), "{err:?}");
    }

    #[test]
    fn stranded_lists_only_old_processing_records() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let mut old = make_record("old", Tier::Low);
        old.status = RecordStatus::Processing;
        old.claimed_at = Some(Utc::now() - chrono::Duration::hours(2));
        store.push(&old).unwrap();
        store.push(&make_record("fresh", Tier::Low)).unwrap();
        store.claim(1, None).unwrap();

        let stranded = store.stranded(Duration::from_secs(3600)).unwrap();
        assert_eq!(ids(&stranded), vec!["old"]);

        // Listing is read-only.
        assert_eq!(store.get("old").unwrap().unwrap().status, RecordStatus::Processing);
        assert_eq!(store.stranded(Duration::ZERO).unwrap().len(), 2);
    }

    #[test]
    fn in_memory_store_supports_full_lifecycle() {
        let store = SqliteDeferredStore::open_in_memory().unwrap();
        store.push(&make_record("m1", Tier::Low)).unwrap();
        let claimed = store.claim(5, Some(Tier::Low)).unwrap();
        assert_eq!(claimed.len(), 1);
        store.complete("m1", "ok").unwrap();
        assert_eq!(store.status().unwrap().completed, 1);
    }
}
