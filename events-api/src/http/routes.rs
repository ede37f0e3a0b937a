use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{State, get, post};
use serde::Serialize;

use events_db::{ActivitySummary, PrIntervalStats, Repository, Store, TimeseriesBucket, TrendingEntry};
use events_ingest::Engine;

use crate::chart::{ChartFormat, ChartRenderer};
use crate::http::error::ApiError;

pub struct AppState {
    pub store: Store,
    pub engine: Arc<Engine>,
    pub chart_renderer: Arc<dyn ChartRenderer>,
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, events_db::StoreError> + Send + 'static,
    T: Send + 'static,
{
    rocket::tokio::task::spawn_blocking(f)
        .await
        .expect("blocking query task panicked")
        .map_err(ApiError::from)
}

fn require_repo(repo: &str) -> Result<(), ApiError> {
    if repo.contains('/') && !repo.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation_field("repo must be of the form owner/name", "repo"))
    }
}

#[derive(Serialize)]
pub struct HealthBody {
    pub status: &'static str,
}

#[get("/health")]
pub async fn health(state: &State<AppState>) -> Result<Json<HealthBody>, ApiError> {
    let store = state.store.clone();
    blocking(move || store.is_ready()).await?;
    Ok(Json(HealthBody { status: "ok" }))
}

#[derive(Serialize)]
pub struct CollectBody {
    pub inserted: usize,
}

#[post("/collect?<limit>")]
pub async fn collect(state: &State<AppState>, limit: Option<usize>) -> Result<Json<CollectBody>, ApiError> {
    let limit = limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(ApiError::validation_field("limit must be between 1 and 1000", "limit"));
    }

    let inserted = state
        .engine
        .collect(limit)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(CollectBody { inserted }))
}

#[get("/metrics/event-counts?<offset_minutes>")]
pub async fn event_counts(
    state: &State<AppState>,
    offset_minutes: Option<i64>,
) -> Result<Json<std::collections::HashMap<String, i64>>, ApiError> {
    let offset_minutes = offset_minutes.unwrap_or(60);
    if offset_minutes < 0 {
        return Err(ApiError::validation_field("offset_minutes must be >= 0", "offset_minutes"));
    }

    let repo = state.store.open_read();
    let counts = blocking(move || repo.event_counts(offset_minutes)).await?;
    Ok(Json(counts))
}

#[get("/metrics/pr-interval?<repo>")]
pub async fn pr_interval(
    state: &State<AppState>,
    repo: Option<String>,
) -> Result<Json<PrIntervalStats>, ApiError> {
    let repo = repo.ok_or_else(|| ApiError::validation_field("repo is required", "repo"))?;
    require_repo(&repo)?;

    let reader = state.store.open_read();
    let stats = blocking(move || reader.pr_interval(&repo)).await?;
    Ok(Json(stats))
}

#[get("/metrics/repository-activity?<repo>&<hours>")]
pub async fn repository_activity(
    state: &State<AppState>,
    repo: Option<String>,
    hours: Option<i64>,
) -> Result<Json<ActivitySummary>, ApiError> {
    let repo = repo.ok_or_else(|| ApiError::validation_field("repo is required", "repo"))?;
    require_repo(&repo)?;
    let hours = hours.unwrap_or(24);

    let reader = state.store.open_read();
    let summary = blocking(move || reader.repository_activity(&repo, hours)).await?;
    Ok(Json(summary))
}

#[get("/metrics/trending?<hours>&<limit>")]
pub async fn trending(
    state: &State<AppState>,
    hours: Option<i64>,
    limit: Option<usize>,
) -> Result<Json<Vec<TrendingEntry>>, ApiError> {
    let hours = hours.unwrap_or(24);
    let limit = limit.unwrap_or(10);
    if limit > 100 {
        return Err(ApiError::validation_field("limit must be <= 100", "limit"));
    }

    let reader = state.store.open_read();
    let entries = blocking(move || reader.trending(hours, limit)).await?;
    Ok(Json(entries))
}

#[get("/metrics/event-counts-timeseries?<hours>&<bucket_minutes>&<repo>")]
pub async fn event_counts_timeseries(
    state: &State<AppState>,
    hours: Option<i64>,
    bucket_minutes: Option<i64>,
    repo: Option<String>,
) -> Result<Json<Vec<TimeseriesBucket>>, ApiError> {
    let hours = hours.unwrap_or(6);
    let bucket_minutes = bucket_minutes.unwrap_or(5);
    if bucket_minutes < 1 {
        return Err(ApiError::validation_field("bucket_minutes must be >= 1", "bucket_minutes"));
    }
    if let Some(repo) = &repo {
        require_repo(repo)?;
    }

    let reader = state.store.open_read();
    let buckets = blocking(move || {
        reader.event_counts_timeseries(hours, bucket_minutes, repo.as_deref())
    })
    .await?;
    Ok(Json(buckets))
}

#[get("/visualization/trending-chart?<hours>&<limit>&<format>")]
pub async fn trending_chart(
    state: &State<AppState>,
    hours: Option<i64>,
    limit: Option<usize>,
    format: Option<String>,
) -> Result<(rocket::http::ContentType, Vec<u8>), ApiError> {
    let hours = hours.unwrap_or(24);
    let limit = limit.unwrap_or(5);
    let format_raw = format.unwrap_or_else(|| "png".to_string());
    let format = ChartFormat::parse(&format_raw)
        .ok_or_else(|| ApiError::validation_field("format must be png or svg", "format"))?;

    let reader: Repository = state.store.open_read();
    let entries = blocking(move || reader.trending(hours, limit)).await?;

    let rendered = state.chart_renderer.render_trending(&entries, format)?;
    let content_type = match format {
        ChartFormat::Png => rocket::http::ContentType::PNG,
        ChartFormat::Svg => rocket::http::ContentType::SVG,
    };

    Ok((content_type, rendered.bytes))
}

pub fn routes() -> Vec<rocket::Route> {
    rocket::routes![
        health,
        collect,
        event_counts,
        pr_interval,
        repository_activity,
        trending,
        event_counts_timeseries,
        trending_chart,
    ]
}
