//! Performance snapshot persistence and the aggregation run-lock.
//!
//! Snapshots are insert-only. The run-lock is a plain table row keyed on
//! (workspace, period, window): inserting it claims the run, deleting it
//! releases it, and a conflicting insert means another run is in flight.

use crate::model::{
    PerformanceMetrics, PerformanceSnapshot, Period, ProjectBreakdown, Rankings, Trends,
};
use crate::store::{Store, req_ts};
use chrono::{DateTime, Utc};
use rusqlite::{Row, params, types::Type};
use std::str::FromStr;

fn decode_error(index: usize, error: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<PerformanceSnapshot> {
    let period_raw: String = row.get("period")?;
    let metrics_json: String = row.get("metrics_json")?;
    let projects_json: String = row.get("projects_json")?;
    let trends_json: Option<String> = row.get("trends_json")?;

    let metrics: PerformanceMetrics =
        serde_json::from_str(&metrics_json).map_err(|error| decode_error(5, error))?;
    let projects: Vec<ProjectBreakdown> =
        serde_json::from_str(&projects_json).map_err(|error| decode_error(6, error))?;
    let trends: Option<Trends> = trends_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|error| decode_error(10, error))?;

    Ok(PerformanceSnapshot {
        snapshot_id: row.get("snapshot_id")?,
        user_id: row.get("user_id")?,
        workspace_id: row.get("workspace_id")?,
        period: Period::from_str(&period_raw).map_err(|error| decode_error(3, error))?,
        snapshot_date: req_ts(row.get("snapshot_date_us")?),
        metrics,
        projects,
        rankings: Rankings {
            rank: row.get("rank")?,
            percentile: row.get("percentile")?,
            total_in_workspace: row.get("total_in_workspace")?,
        },
        trends,
        created_at: req_ts(row.get("created_at_us")?),
    })
}

const SNAPSHOT_COLUMNS: &str = "snapshot_id, user_id, workspace_id, period, snapshot_date_us, \
     metrics_json, projects_json, rank, percentile, total_in_workspace, trends_json, \
     created_at_us";

impl Store {
    /// Persist one snapshot. An identical `snapshot_id` means identical
    /// coordinates and write time, so the row is replaced: a rerun sharing a
    /// clock reading overwrites its own output instead of failing.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or a JSON column fails to encode.
    pub fn insert_snapshot(&self, snapshot: &PerformanceSnapshot) -> rusqlite::Result<()> {
        let metrics_json =
            serde_json::to_string(&snapshot.metrics).map_err(|error| decode_error(5, error))?;
        let projects_json =
            serde_json::to_string(&snapshot.projects).map_err(|error| decode_error(6, error))?;
        let trends_json = snapshot
            .trends
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| decode_error(10, error))?;

        let sql = format!(
            "INSERT OR REPLACE INTO performance_snapshots ({SNAPSHOT_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        );
        self.conn.execute(
            &sql,
            params![
                snapshot.snapshot_id,
                snapshot.user_id,
                snapshot.workspace_id,
                snapshot.period.to_string(),
                snapshot.snapshot_date.timestamp_micros(),
                metrics_json,
                projects_json,
                snapshot.rankings.rank,
                snapshot.rankings.percentile,
                snapshot.rankings.total_in_workspace,
                trends_json,
                snapshot.created_at.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    /// The newest snapshot for (user, period) strictly before `date`. Feeds
    /// trend deltas.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn latest_snapshot_before(
        &self,
        user_id: &str,
        period: Period,
        date: DateTime<Utc>,
    ) -> rusqlite::Result<Option<PerformanceSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM performance_snapshots
             WHERE user_id = ?1 AND period = ?2 AND snapshot_date_us < ?3
             ORDER BY snapshot_date_us DESC, created_at_us DESC
             LIMIT 1"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query_map(
            params![user_id, period.to_string(), date.timestamp_micros()],
            |row| snapshot_from_row(row),
        )?;
        rows.next().transpose()
    }

    /// Snapshots for (user, period) within a date range, newest first.
    /// Superseded snapshots for a date are filtered out — only the latest
    /// write per snapshot date is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn snapshots_for_user(
        &self,
        user_id: &str,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> rusqlite::Result<Vec<PerformanceSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM performance_snapshots AS outer_snap
             WHERE user_id = ?1 AND period = ?2
               AND snapshot_date_us >= ?3 AND snapshot_date_us <= ?4
               AND created_at_us = (
                   SELECT MAX(created_at_us) FROM performance_snapshots
                   WHERE user_id = outer_snap.user_id
                     AND period = outer_snap.period
                     AND snapshot_date_us = outer_snap.snapshot_date_us
               )
             ORDER BY snapshot_date_us DESC"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![
                user_id,
                period.to_string(),
                from.timestamp_micros(),
                to.timestamp_micros()
            ],
            |row| snapshot_from_row(row),
        )?;
        rows.collect()
    }

    /// The latest snapshot per user in a workspace for one period. Feeds the
    /// employee list.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn latest_workspace_snapshots(
        &self,
        workspace_id: &str,
        period: Period,
    ) -> rusqlite::Result<Vec<PerformanceSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM performance_snapshots AS outer_snap
             WHERE workspace_id = ?1 AND period = ?2
               AND created_at_us = (
                   SELECT MAX(created_at_us) FROM performance_snapshots
                   WHERE workspace_id = outer_snap.workspace_id
                     AND period = outer_snap.period
                     AND user_id = outer_snap.user_id
               )
             ORDER BY user_id"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![workspace_id, period.to_string()], |row| {
            snapshot_from_row(row)
        })?;
        rows.collect()
    }

    /// Claim the run-lock for (workspace, period, window). Returns `false`
    /// when another run already holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails for any reason other than the
    /// key already existing.
    pub fn try_begin_run(
        &self,
        workspace_id: &str,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> rusqlite::Result<bool> {
        let claimed = self.conn.execute(
            "INSERT OR IGNORE INTO aggregation_runs
                 (workspace_id, period, window_start_us, window_end_us, started_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                workspace_id,
                period.to_string(),
                window_start.timestamp_micros(),
                window_end.timestamp_micros(),
                now.timestamp_micros(),
            ],
        )?;
        Ok(claimed == 1)
    }

    /// Release the run-lock. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn finish_run(
        &self,
        workspace_id: &str,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> rusqlite::Result<()> {
        self.conn.execute(
            "DELETE FROM aggregation_runs
             WHERE workspace_id = ?1 AND period = ?2
               AND window_start_us = ?3 AND window_end_us = ?4",
            params![
                workspace_id,
                period.to_string(),
                window_start.timestamp_micros(),
                window_end.timestamp_micros(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        PerformanceMetrics, PerformanceSnapshot, Period, Rankings,
    };
    use crate::store::Store;
    use chrono::{DateTime, TimeZone, Utc};

    fn snapshot(user: &str, date: DateTime<Utc>, created: DateTime<Utc>, score: f64) -> PerformanceSnapshot {
        PerformanceSnapshot {
            snapshot_id: PerformanceSnapshot::derive_id(user, Period::Weekly, date, created),
            user_id: user.to_string(),
            workspace_id: "ws-1".to_string(),
            period: Period::Weekly,
            snapshot_date: date,
            metrics: PerformanceMetrics {
                productivity_score: score,
                ..PerformanceMetrics::default()
            },
            projects: Vec::new(),
            rankings: Rankings {
                rank: 1,
                percentile: 0.0,
                total_in_workspace: 1,
            },
            trends: None,
            created_at: created,
        }
    }

    #[test]
    fn snapshot_roundtrips() {
        let store = Store::open_in_memory().expect("open store");
        let date = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let snap = snapshot("emp-1", date, date, 72.5);
        store.insert_snapshot(&snap).expect("insert");

        let loaded = store
            .snapshots_for_user("emp-1", Period::Weekly, date, date)
            .expect("query");
        assert_eq!(loaded, vec![snap]);
    }

    #[test]
    fn newer_write_supersedes_for_same_date() {
        let store = Store::open_in_memory().expect("open store");
        let date = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let first_run = Utc.with_ymd_and_hms(2024, 4, 1, 6, 0, 0).unwrap();
        let second_run = Utc.with_ymd_and_hms(2024, 4, 1, 7, 0, 0).unwrap();

        store
            .insert_snapshot(&snapshot("emp-1", date, first_run, 50.0))
            .expect("insert");
        store
            .insert_snapshot(&snapshot("emp-1", date, second_run, 80.0))
            .expect("insert");

        let loaded = store
            .snapshots_for_user("emp-1", Period::Weekly, date, date)
            .expect("query");
        assert_eq!(loaded.len(), 1);
        assert!((loaded[0].metrics.productivity_score - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rerun_sharing_a_write_time_replaces_its_own_row() {
        let store = Store::open_in_memory().expect("open store");
        let date = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let run = Utc.with_ymd_and_hms(2024, 4, 1, 6, 0, 0).unwrap();

        let first = snapshot("emp-1", date, run, 50.0);
        let second = snapshot("emp-1", date, run, 80.0);
        assert_eq!(first.snapshot_id, second.snapshot_id);

        store.insert_snapshot(&first).expect("insert");
        store.insert_snapshot(&second).expect("reinsert");

        let loaded = store
            .snapshots_for_user("emp-1", Period::Weekly, date, date)
            .expect("query");
        assert_eq!(loaded.len(), 1);
        assert!((loaded[0].metrics.productivity_score - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn trend_source_is_strictly_before_date() {
        let store = Store::open_in_memory().expect("open store");
        let week1 = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let week2 = Utc.with_ymd_and_hms(2024, 4, 8, 0, 0, 0).unwrap();
        store
            .insert_snapshot(&snapshot("emp-1", week1, week1, 60.0))
            .expect("insert");
        store
            .insert_snapshot(&snapshot("emp-1", week2, week2, 70.0))
            .expect("insert");

        let prior = store
            .latest_snapshot_before("emp-1", Period::Weekly, week2)
            .expect("query")
            .expect("present");
        assert_eq!(prior.snapshot_date, week1);

        assert!(
            store
                .latest_snapshot_before("emp-1", Period::Weekly, week1)
                .expect("query")
                .is_none()
        );
    }

    #[test]
    fn run_lock_single_claimant() {
        let store = Store::open_in_memory().expect("open store");
        let start = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 4, 8, 0, 0, 0).unwrap();

        assert!(
            store
                .try_begin_run("ws-1", Period::Weekly, start, end, end)
                .expect("claim")
        );
        assert!(
            !store
                .try_begin_run("ws-1", Period::Weekly, start, end, end)
                .expect("second claim")
        );
        // A different window is a different lock.
        assert!(
            store
                .try_begin_run("ws-1", Period::Daily, start, end, end)
                .expect("other period")
        );

        store
            .finish_run("ws-1", Period::Weekly, start, end)
            .expect("release");
        assert!(
            store
                .try_begin_run("ws-1", Period::Weekly, start, end, end)
                .expect("reclaim")
        );
    }
}
