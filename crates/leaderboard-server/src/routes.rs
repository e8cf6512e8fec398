use axum::{
    Json, Router,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use game_controller::store::{
    LEADERBOARD_LIMIT, LeaderboardEntry, ProfileUpdate, ScoreRecord, UserProfile,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;

type ApiError = (StatusCode, String);

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
pub(crate) struct DailyResponse {
    day: String,
    entries: Vec<LeaderboardEntry>,
}

#[derive(Serialize)]
pub(crate) struct AllTimeResponse {
    limit: usize,
    entries: Vec<LeaderboardEntry>,
}

#[derive(Deserialize, Default)]
pub struct DailyQuery {
    day: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct AllTimeQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SubmitScore {
    user_id: String,
    score: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/leaderboard/daily", get(daily_leaderboard))
        .route("/leaderboard/all-time", get(all_time_leaderboard))
        .route("/scores", post(submit_score))
        .route("/users", put(upsert_user))
        .route("/users/:id", get(get_user))
        .with_state(state)
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub(crate) async fn daily_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<DailyQuery>,
) -> Result<Json<DailyResponse>, ApiError> {
    if let Some(day) = query.day.as_deref() {
        if !is_iso_day(day) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("day must be YYYY-MM-DD, got {day:?}"),
            ));
        }
    }
    let (day, entries) = state.with_store(|store| {
        let day = match query.day {
            Some(day) => day,
            None => store.today()?,
        };
        let entries = store.daily_scores(&day)?;
        Ok((day, entries))
    })?;
    Ok(Json(DailyResponse { day, entries }))
}

pub(crate) async fn all_time_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<AllTimeQuery>,
) -> Result<Json<AllTimeResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(LEADERBOARD_LIMIT)
        .clamp(1, LEADERBOARD_LIMIT);
    let entries = state.with_store(|store| store.all_time_scores(limit))?;
    Ok(Json(AllTimeResponse { limit, entries }))
}

pub(crate) async fn submit_score(
    State(state): State<AppState>,
    Json(body): Json<SubmitScore>,
) -> Result<(StatusCode, Json<ScoreRecord>), ApiError> {
    if body.user_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "user_id is required".to_string()));
    }
    if body.score == 0 {
        warn!("rejected zero score" = %body.user_id);
        return Err((StatusCode::BAD_REQUEST, "score must be positive".to_string()));
    }
    if i64::try_from(body.score).is_err() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("score must be at most {}", i64::MAX),
        ));
    }
    let record = state.with_store(|store| store.save_score(&body.user_id, body.score))?;
    info!("score saved" = record.id, "user" = %record.user_id, "score" = record.score);
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn upsert_user(
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    if update.id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "id is required".to_string()));
    }
    let profile = state.with_store(|store| store.upsert_user(&update))?;
    Ok(Json(profile))
}

pub(crate) async fn get_user(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<UserProfile>, ApiError> {
    state
        .with_store(|store| store.get_user(&id))?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("user {id} not found")))
}

fn is_iso_day(day: &str) -> bool {
    let bytes = day.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}
