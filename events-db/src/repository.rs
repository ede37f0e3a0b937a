use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::models::DbEvent;
use crate::schema::events;

#[derive(Debug, Clone, Serialize)]
pub struct IntervalStats {
    pub mean_seconds: f64,
    pub median_seconds: f64,
    pub min_seconds: f64,
    pub max_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrIntervalStats {
    pub count: i64,
    pub stats: Option<IntervalStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub counts: HashMap<String, i64>,
    pub unique_actors: i64,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendingEntry {
    pub repo_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesBucket {
    pub bucket_start: DateTime<Utc>,
    pub counts: HashMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrDayCounts {
    pub day: NaiveDate,
    pub opened: i64,
    pub closed: i64,
    pub merged: i64,
}

/// Read-only analytic surface over the event store. Never mutates state;
/// repeated calls against an unchanging store return identical results.
#[derive(Clone)]
pub struct Repository {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl Repository {
    pub(crate) fn new(conn: Arc<Mutex<SqliteConnection>>) -> Self {
        Self { conn }
    }

    /// §4.C.1 — event counts by type for `[now - offset_minutes, now)`.
    pub fn event_counts(&self, offset_minutes: i64) -> StoreResult<HashMap<String, i64>> {
        self.event_counts_at(Utc::now(), offset_minutes)
    }

    fn event_counts_at(
        &self,
        now: DateTime<Utc>,
        offset_minutes: i64,
    ) -> StoreResult<HashMap<String, i64>> {
        let window_start = (now - ChronoDuration::minutes(offset_minutes)).naive_utc();
        let window_end = now.naive_utc();

        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        let rows: Vec<(String, i64)> = events::table
            .filter(events::created_at.ge(window_start))
            .filter(events::created_at.lt(window_end))
            .group_by(events::event_type)
            .select((events::event_type, diesel::dsl::count_star()))
            .load(&mut *conn)
            .map_err(StoreError::Query)?;

        Ok(rows.into_iter().collect())
    }

    /// §4.C.2 — average pull-request interval for `repo_name`.
    pub fn pr_interval(&self, repo_name: &str) -> StoreResult<PrIntervalStats> {
        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        let mut timestamps: Vec<NaiveDateTime> = events::table
            .filter(events::repo_name.eq(repo_name))
            .filter(events::event_type.eq("PullRequestEvent"))
            .select(events::created_at)
            .load(&mut *conn)
            .map_err(StoreError::Query)?;

        timestamps.sort();

        let count = timestamps.len() as i64;
        if timestamps.len() < 2 {
            return Ok(PrIntervalStats { count, stats: None });
        }

        let mut intervals: Vec<f64> = timestamps
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_seconds() as f64)
            .collect();

        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let min = intervals.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = intervals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        intervals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = intervals.len() / 2;
        let median = if intervals.len() % 2 == 0 {
            (intervals[mid - 1] + intervals[mid]) / 2.0
        } else {
            intervals[mid]
        };

        Ok(PrIntervalStats {
            count,
            stats: Some(IntervalStats {
                mean_seconds: mean,
                median_seconds: median,
                min_seconds: min,
                max_seconds: max,
            }),
        })
    }

    /// §4.C.3 — per-repo activity summary over the trailing `hours`.
    pub fn repository_activity(&self, repo_name: &str, hours: i64) -> StoreResult<ActivitySummary> {
        self.repository_activity_at(Utc::now(), repo_name, hours)
    }

    fn repository_activity_at(
        &self,
        now: DateTime<Utc>,
        repo_name: &str,
        hours: i64,
    ) -> StoreResult<ActivitySummary> {
        let window_start = (now - ChronoDuration::hours(hours)).naive_utc();
        let window_end = now.naive_utc();

        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        let counts: Vec<(String, i64)> = events::table
            .filter(events::repo_name.eq(repo_name))
            .filter(events::created_at.ge(window_start))
            .filter(events::created_at.lt(window_end))
            .group_by(events::event_type)
            .select((events::event_type, diesel::dsl::count_star()))
            .load(&mut *conn)
            .map_err(StoreError::Query)?;

        let unique_actors: i64 = events::table
            .filter(events::repo_name.eq(repo_name))
            .filter(events::created_at.ge(window_start))
            .filter(events::created_at.lt(window_end))
            .select(diesel::dsl::count_distinct(events::actor_login))
            .first(&mut *conn)
            .map_err(StoreError::Query)?;

        let first_event_at: Option<NaiveDateTime> = events::table
            .filter(events::repo_name.eq(repo_name))
            .filter(events::created_at.ge(window_start))
            .filter(events::created_at.lt(window_end))
            .select(diesel::dsl::min(events::created_at))
            .first(&mut *conn)
            .map_err(StoreError::Query)?;

        let last_event_at: Option<NaiveDateTime> = events::table
            .filter(events::repo_name.eq(repo_name))
            .filter(events::created_at.ge(window_start))
            .filter(events::created_at.lt(window_end))
            .select(diesel::dsl::max(events::created_at))
            .first(&mut *conn)
            .map_err(StoreError::Query)?;

        Ok(ActivitySummary {
            counts: counts.into_iter().collect(),
            unique_actors,
            first_event_at: first_event_at.map(|naive| naive.and_utc()),
            last_event_at: last_event_at.map(|naive| naive.and_utc()),
        })
    }

    /// §4.C.4 — trending repositories by event count over `hours`, descending,
    /// ties broken alphabetically by `repo_name`, truncated to `limit`.
    pub fn trending(&self, hours: i64, limit: usize) -> StoreResult<Vec<TrendingEntry>> {
        self.trending_at(Utc::now(), hours, limit)
    }

    fn trending_at(
        &self,
        now: DateTime<Utc>,
        hours: i64,
        limit: usize,
    ) -> StoreResult<Vec<TrendingEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let window_start = (now - ChronoDuration::hours(hours)).naive_utc();
        let window_end = now.naive_utc();

        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        let mut rows: Vec<(String, i64)> = events::table
            .filter(events::created_at.ge(window_start))
            .filter(events::created_at.lt(window_end))
            .group_by(events::repo_name)
            .select((events::repo_name, diesel::dsl::count_star()))
            .load(&mut *conn)
            .map_err(StoreError::Query)?;

        // Diesel/SQLite don't guarantee row order for a plain group_by, so
        // the descending-count / alphabetical tie-break is applied here.
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(limit);

        Ok(rows
            .into_iter()
            .map(|(repo_name, count)| TrendingEntry { repo_name, count })
            .collect())
    }

    /// §4.C.5 — event-count timeseries, bucketed and anchored at `now`,
    /// going backward; empty buckets are included with zero counts.
    pub fn event_counts_timeseries(
        &self,
        hours: i64,
        bucket_minutes: i64,
        repo_name: Option<&str>,
    ) -> StoreResult<Vec<TimeseriesBucket>> {
        self.event_counts_timeseries_at(Utc::now(), hours, bucket_minutes, repo_name)
    }

    fn event_counts_timeseries_at(
        &self,
        now: DateTime<Utc>,
        hours: i64,
        bucket_minutes: i64,
        repo_name: Option<&str>,
    ) -> StoreResult<Vec<TimeseriesBucket>> {
        let window_start = now - ChronoDuration::hours(hours);

        let bucket_count =
            ((hours * 60) as f64 / bucket_minutes as f64).ceil() as i64;

        let mut buckets: Vec<TimeseriesBucket> = (0..bucket_count)
            .map(|i| TimeseriesBucket {
                bucket_start: window_start + ChronoDuration::minutes(i * bucket_minutes),
                counts: HashMap::new(),
            })
            .collect();

        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        let query = events::table
            .filter(events::created_at.ge(window_start.naive_utc()))
            .filter(events::created_at.lt(now.naive_utc()))
            .into_boxed::<diesel::sqlite::Sqlite>();

        let query = if let Some(repo_name) = repo_name {
            query.filter(events::repo_name.eq(repo_name))
        } else {
            query
        };

        let rows: Vec<(NaiveDateTime, String)> = query
            .select((events::created_at, events::event_type))
            .load(&mut *conn)
            .map_err(StoreError::Query)?;

        for (created_at, event_type) in rows {
            let created_at = created_at.and_utc();
            let minutes_from_start = (created_at - window_start).num_seconds() as f64 / 60.0;
            let bucket_index = (minutes_from_start / bucket_minutes as f64).floor() as i64;
            if let Some(bucket) = bucket_index
                .try_into()
                .ok()
                .and_then(|i: usize| buckets.get_mut(i))
            {
                *bucket.counts.entry(event_type).or_insert(0) += 1;
            }
        }

        Ok(buckets)
    }

    /// §4.C.6 — per-day pull-request open/close/merge counts for `repo_name`
    /// over the trailing `days`.
    pub fn pr_timeline(&self, repo_name: &str, days: i64) -> StoreResult<Vec<PrDayCounts>> {
        self.pr_timeline_at(Utc::now(), repo_name, days)
    }

    fn pr_timeline_at(
        &self,
        now: DateTime<Utc>,
        repo_name: &str,
        days: i64,
    ) -> StoreResult<Vec<PrDayCounts>> {
        let window_start = now - ChronoDuration::days(days);

        let mut conn = self.conn.lock().expect("event store mutex poisoned");

        let rows: Vec<DbEvent> = events::table
            .filter(events::repo_name.eq(repo_name))
            .filter(events::event_type.eq("PullRequestEvent"))
            .filter(events::created_at.ge(window_start.naive_utc()))
            .filter(events::created_at.lt(now.naive_utc()))
            .select(DbEvent::as_select())
            .load(&mut *conn)
            .map_err(StoreError::Query)?;

        let mut by_day: HashMap<NaiveDate, PrDayCounts> = HashMap::new();

        for row in rows {
            let day = row.created_at.date();
            let payload: serde_json::Value =
                serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null);
            let action = payload.get("action").and_then(|v| v.as_str()).unwrap_or("");
            let merged = payload
                .get("pull_request")
                .and_then(|pr| pr.get("merged"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            let entry = by_day.entry(day).or_insert(PrDayCounts {
                day,
                opened: 0,
                closed: 0,
                merged: 0,
            });

            match action {
                "opened" => entry.opened += 1,
                "closed" if merged => entry.merged += 1,
                "closed" => entry.closed += 1,
                _ => {}
            }
        }

        let mut result: Vec<PrDayCounts> = by_day.into_values().collect();
        result.sort_by_key(|d| d.day);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Event, Store};
    use serde_json::json;

    fn store() -> Store {
        Store::initialize_in_memory().unwrap()
    }

    fn event(id: &str, event_type: &str, repo: &str, at: DateTime<Utc>) -> Event {
        Event::new(id, event_type, repo, "alice", at, json!({}), at)
    }

    #[test]
    fn event_counts_window_is_half_open_and_empty_window_is_empty() {
        let store = store();
        let repo = store.open_read();
        let now = Utc::now();

        store
            .insert_events(&[event("A1", "WatchEvent", "o/r", now - ChronoDuration::minutes(30))])
            .unwrap();

        let empty = repo.event_counts_at(now, 0).unwrap();
        assert!(empty.is_empty());

        let counts = repo.event_counts_at(now, 60).unwrap();
        assert_eq!(counts.get("WatchEvent"), Some(&1));
    }

    #[test]
    fn window_monotonicity() {
        let store = store();
        let repo = store.open_read();
        let now = Utc::now();

        store
            .insert_events(&[
                event("A1", "WatchEvent", "o/r", now - ChronoDuration::minutes(10)),
                event("A2", "WatchEvent", "o/r", now - ChronoDuration::minutes(50)),
            ])
            .unwrap();

        let small = repo.event_counts_at(now, 20).unwrap();
        let big = repo.event_counts_at(now, 120).unwrap();

        assert!(small.get("WatchEvent").copied().unwrap_or(0) <= big.get("WatchEvent").copied().unwrap_or(0));
    }

    #[test]
    fn pr_interval_with_fewer_than_two_events_is_not_an_error() {
        let store = store();
        let repo = store.open_read();

        let stats = repo.pr_interval("o/r").unwrap();
        assert_eq!(stats.count, 0);
        assert!(stats.stats.is_none());
    }

    #[test]
    fn pr_interval_computes_seed_scenario() {
        let store = store();
        let repo = store.open_read();
        let t = Utc::now();

        store
            .insert_events(&[
                event("P1", "PullRequestEvent", "o/r", t),
                event("P2", "PullRequestEvent", "o/r", t + ChronoDuration::seconds(60)),
                event("P3", "PullRequestEvent", "o/r", t + ChronoDuration::seconds(180)),
            ])
            .unwrap();

        let stats = repo.pr_interval("o/r").unwrap();
        assert_eq!(stats.count, 3);
        let s = stats.stats.unwrap();
        assert!((s.mean_seconds - 90.0).abs() < 1e-6);
        assert_eq!(s.median_seconds, 90.0);
        assert_eq!(s.min_seconds, 60.0);
        assert_eq!(s.max_seconds, 120.0);
    }

    #[test]
    fn trending_ties_break_alphabetically() {
        let store = store();
        let repo = store.open_read();
        let now = Utc::now();

        let mut batch = Vec::new();
        for i in 0..3 {
            batch.push(event(&format!("a{i}"), "WatchEvent", "a/x", now));
        }
        for i in 0..3 {
            batch.push(event(&format!("b{i}"), "WatchEvent", "b/y", now));
        }
        for i in 0..2 {
            batch.push(event(&format!("c{i}"), "WatchEvent", "c/z", now));
        }
        store.insert_events(&batch).unwrap();

        let top = repo.trending_at(now, 1, 2).unwrap();
        assert_eq!(
            top,
            vec![
                TrendingEntry { repo_name: "a/x".to_string(), count: 3 },
                TrendingEntry { repo_name: "b/y".to_string(), count: 3 },
            ]
        );
    }

    #[test]
    fn trending_limit_zero_is_empty() {
        let store = store();
        let repo = store.open_read();
        assert!(repo.trending(1, 0).unwrap().is_empty());
    }

    #[test]
    fn timeseries_bucket_count_is_exact_and_buckets_are_ordered() {
        let store = store();
        let repo = store.open_read();
        let now = Utc::now();

        let buckets = repo.event_counts_timeseries_at(now, 1, 20, None).unwrap();
        assert_eq!(buckets.len(), 3);
        for pair in buckets.windows(2) {
            assert!(pair[0].bucket_start < pair[1].bucket_start);
        }
    }

    #[test]
    fn timeseries_counts_land_in_the_right_bucket() {
        let store = store();
        let repo = store.open_read();
        let now = Utc::now();

        store
            .insert_events(&[event(
                "A1",
                "WatchEvent",
                "o/r",
                now - ChronoDuration::minutes(2),
            )])
            .unwrap();

        let buckets = repo.event_counts_timeseries_at(now, 1, 5, None).unwrap();
        let last = buckets.last().unwrap();
        assert_eq!(last.counts.get("WatchEvent"), Some(&1));
    }

    #[test]
    fn repository_activity_counts_and_actor_set() {
        let store = store();
        let repo = store.open_read();
        let now = Utc::now();

        store
            .insert_events(&[
                event("A1", "WatchEvent", "o/r", now - ChronoDuration::minutes(5)),
                event("A2", "PullRequestEvent", "o/r", now - ChronoDuration::minutes(1)),
            ])
            .unwrap();

        let summary = repo.repository_activity_at(now, "o/r", 24).unwrap();
        assert_eq!(summary.counts.get("WatchEvent"), Some(&1));
        assert_eq!(summary.counts.get("PullRequestEvent"), Some(&1));
        assert_eq!(summary.unique_actors, 1);
        assert!(summary.first_event_at.is_some());
        assert!(summary.last_event_at.is_some());
    }
}
