//! SQLite-backed [`RecordStore`].
//!
//! A single connection is shared behind a mutex and every statement runs on
//! the blocking thread pool. Creation times are stored as fixed-width
//! RFC 3339 text so that lexical order matches chronological order.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::{QUERY_LIMIT, RecordStore, StoreError};
use crate::{mapper::parse_timestamp, protocol::DrugRecord};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS druginfo (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        manu_lotnum TEXT,
        manu_date TEXT,
        expy_end TEXT,
        alt_name TEXT,
        kcsb INTEGER DEFAULT 0,
        msg TEXT,
        create_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_druginfo_name ON druginfo(name);
";

const SELECT_COLUMNS: &str =
    "name, manu_lotnum, manu_date, expy_end, alt_name, kcsb, msg, create_time";

struct Inner {
    conn: Connection,
    last_created_at: Option<DateTime<Utc>>,
}

impl Inner {
    /// Next creation time: the current time, bumped past the previous one.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let next = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(next);
        next
    }
}

/// Drug record store over a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the schema cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                last_created_at: None,
            })),
        })
    }

    /// Total number of stored rows.
    ///
    /// # Errors
    ///
    /// Returns the failure raised by the database.
    pub async fn row_count(&self) -> Result<u64, StoreError> {
        self.run(|inner| {
            let count: i64 =
                inner
                    .conn
                    .query_row("SELECT COUNT(*) FROM druginfo", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Inner) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&mut lock(&inner))).await?
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn format_created_at(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Escape `LIKE` wildcards so `fragment` matches literally.
fn like_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for ch in fragment.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn require_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::EmptyName);
    }
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<DrugRecord> {
    let created: Option<String> = row.get(7)?;
    Ok(DrugRecord {
        name: row.get(0)?,
        lot_number: row.get(1)?,
        manufacture_date: row.get(2)?,
        expiry_date: row.get(3)?,
        alt_name: row.get(4)?,
        stock_shortage_flag: row.get::<_, Option<i32>>(5)?.unwrap_or_default(),
        note: row.get(6)?,
        created_at: created.as_deref().and_then(parse_timestamp),
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, record: DrugRecord) -> Result<(), StoreError> {
        require_name(&record.name)?;
        self.run(move |inner| {
            let created_at = format_created_at(inner.next_created_at());
            inner.conn.execute(
                "INSERT INTO druginfo (name, manu_lotnum, manu_date, expy_end, alt_name, kcsb, \
                 msg, create_time) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.name,
                    record.lot_number,
                    record.manufacture_date,
                    record.expiry_date,
                    record.alt_name,
                    record.stock_shortage_flag,
                    record.note,
                    created_at,
                ],
            )?;
            debug!(name = %record.name, %created_at, "inserted drug record");
            Ok(())
        })
        .await
    }

    async fn find_by_name(&self, fragment: &str) -> Result<Vec<DrugRecord>, StoreError> {
        let pattern = like_pattern(fragment);
        self.run(move |inner| {
            let mut stmt = inner.conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM druginfo WHERE name LIKE ?1 ESCAPE '\\' ORDER BY \
                 create_time DESC, id DESC LIMIT ?2"
            ))?;
            let limit = i64::try_from(QUERY_LIMIT).unwrap_or(i64::MAX);
            let rows = stmt.query_map(params![pattern, limit], row_to_record)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn upsert_manufacture_date(&self, name: &str, date: &str) -> Result<(), StoreError> {
        require_name(name)?;
        let name = name.to_owned();
        let date = date.to_owned();
        self.run(move |inner| {
            let created_at = format_created_at(inner.next_created_at());
            let tx = inner.conn.transaction()?;
            let latest: Option<i64> = tx
                .query_row(
                    "SELECT id FROM druginfo WHERE name = ?1 ORDER BY create_time DESC, id DESC \
                     LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            match latest {
                Some(id) => {
                    tx.execute(
                        "UPDATE druginfo SET manu_date = ?1 WHERE id = ?2",
                        params![date, id],
                    )?;
                    debug!(%name, id, "updated manufacture date");
                }
                None => {
                    tx.execute(
                        "INSERT INTO druginfo (name, manu_date, create_time) VALUES (?1, ?2, ?3)",
                        params![name, date, created_at],
                    )?;
                    debug!(%name, "inserted manufacture date");
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn latest_manufacture_date(&self, name: &str) -> Result<Option<String>, StoreError> {
        let name = name.to_owned();
        self.run(move |inner| {
            Ok(inner
                .conn
                .query_row(
                    "SELECT manu_date FROM druginfo WHERE name = ?1 AND manu_date IS NOT NULL AND \
                     TRIM(manu_date, char(32, 9, 10, 11, 12, 13)) <> '' \
                     ORDER BY create_time DESC, id DESC LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn store() -> SqliteStore { SqliteStore::in_memory().expect("in-memory store should open") }

    fn record(name: &str, lot: &str) -> DrugRecord {
        DrugRecord {
            name: name.into(),
            lot_number: Some(lot.into()),
            ..DrugRecord::default()
        }
    }

    #[rstest]
    #[tokio::test]
    async fn query_returns_ten_newest_of_fifteen(store: SqliteStore) {
        for i in 0..15 {
            store
                .insert(record("Paracetamol 500mg", &format!("L{i:02}")))
                .await
                .expect("insert should succeed");
        }

        let rows = store
            .find_by_name("paracetamol")
            .await
            .expect("query should succeed");

        let lots: Vec<_> = rows.iter().filter_map(|r| r.lot_number.as_deref()).collect();
        assert_eq!(
            lots,
            ["L14", "L13", "L12", "L11", "L10", "L09", "L08", "L07", "L06", "L05"]
        );
        assert!(rows.windows(2).all(|w| w[0].created_at > w[1].created_at));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[tokio::test]
    async fn insert_rejects_blank_name(store: SqliteStore, #[case] name: &str) {
        let err = store
            .insert(record(name, "L1"))
            .await
            .expect_err("blank name must be rejected");

        assert!(matches!(err, StoreError::EmptyName));
        assert_eq!(store.row_count().await.expect("count should succeed"), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn client_supplied_creation_time_is_replaced(store: SqliteStore) {
        let stale = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let mut rec = record("Aspirin", "L1");
        rec.created_at = Some(stale);

        store.insert(rec).await.expect("insert should succeed");
        let rows = store.find_by_name("Aspirin").await.expect("query should succeed");

        assert_eq!(rows.len(), 1);
        assert!(rows[0].created_at.is_some_and(|ts| ts > stale));
    }

    #[rstest]
    #[tokio::test]
    async fn wildcards_in_fragment_match_literally(store: SqliteStore) {
        store.insert(record("100% Saline", "A")).await.expect("insert should succeed");
        store.insert(record("1000 Saline", "B")).await.expect("insert should succeed");
        store.insert(record("Vit_C", "C")).await.expect("insert should succeed");
        store.insert(record("VitXC", "D")).await.expect("insert should succeed");

        let percent = store.find_by_name("0%").await.expect("query should succeed");
        let underscore = store.find_by_name("t_c").await.expect("query should succeed");

        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].name, "100% Saline");
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].name, "Vit_C");
    }

    #[rstest]
    #[tokio::test]
    async fn upsert_updates_most_recent_row_only(store: SqliteStore) {
        store.insert(record("Insulin", "OLD")).await.expect("insert should succeed");
        store.insert(record("Insulin", "NEW")).await.expect("insert should succeed");

        store
            .upsert_manufacture_date("Insulin", "2024-06")
            .await
            .expect("upsert should succeed");

        let rows = store.find_by_name("Insulin").await.expect("query should succeed");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lot_number.as_deref(), Some("NEW"));
        assert_eq!(rows[0].manufacture_date.as_deref(), Some("2024-06"));
        assert_eq!(rows[1].manufacture_date, None);
    }

    #[rstest]
    #[tokio::test]
    async fn upsert_inserts_when_name_is_new(store: SqliteStore) {
        store
            .upsert_manufacture_date("Heparin", "2024-02")
            .await
            .expect("upsert should succeed");

        let rows = store.find_by_name("Heparin").await.expect("query should succeed");
        assert_eq!(rows, vec![DrugRecord {
            name: "Heparin".into(),
            manufacture_date: Some("2024-02".into()),
            created_at: rows[0].created_at,
            ..DrugRecord::default()
        }]);
    }

    #[rstest]
    #[tokio::test]
    async fn upsert_matches_exact_name_only(store: SqliteStore) {
        store.insert(record("Insulin Glargine", "L1")).await.expect("insert should succeed");

        store
            .upsert_manufacture_date("Insulin", "2024-06")
            .await
            .expect("upsert should succeed");

        assert_eq!(store.row_count().await.expect("count should succeed"), 2);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\n")]
    #[tokio::test]
    async fn latest_manufacture_date_skips_blank_values(
        store: SqliteStore,
        #[case] blank: &str,
    ) {
        store
            .insert(DrugRecord::with_manufacture_date("Morphine", "2023-11"))
            .await
            .expect("insert should succeed");
        store
            .insert(DrugRecord::with_manufacture_date("Morphine", blank))
            .await
            .expect("insert should succeed");

        let date = store
            .latest_manufacture_date("Morphine")
            .await
            .expect("lookup should succeed");
        let missing = store
            .latest_manufacture_date("Codeine")
            .await
            .expect("lookup should succeed");

        assert_eq!(date.as_deref(), Some("2023-11"));
        assert_eq!(missing, None);
    }

    #[test]
    fn creation_times_strictly_increase() {
        let store = SqliteStore::in_memory().expect("in-memory store should open");
        let mut inner = lock(&store.inner);
        let first = inner.next_created_at();
        let second = inner.next_created_at();
        let third = inner.next_created_at();

        assert!(first < second && second < third);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(r"a%b_c\d"), r"%a\%b\_c\\d%");
    }
}
