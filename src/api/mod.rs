use axum::Json;
use axum::extract::Query;
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{FavoriteCourse, SelectionHistoryEntry, SelectionStatus};
use crate::services::{
    BatchOperation, BatchSummary, ConflictCheck, EmergencyAction, EmergencyService, MySelections,
    SelectionPeriod, SelectionService,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/selection/status", get(selection_status))
        .route("/selection/select", post(select_course))
        .route("/selection/drop", post(drop_course))
        .route("/selection/mine", get(my_selections))
        .route("/selection/history", get(selection_history))
        .route("/selection/conflicts/time", get(time_conflict))
        .route("/selection/conflicts/credits", get(credit_conflict))
        .route(
            "/favorites",
            get(list_favorites).post(add_favorite).delete(remove_favorite),
        )
        .route("/admin/selection/adjust", post(admin_adjust))
        .route("/admin/selection/batch", post(admin_batch))
        .route("/admin/selection/stop", post(admin_stop))
        .with_state(state)
}

fn selection_service(state: &AppState) -> SelectionService {
    SelectionService::new(
        state.db.clone(),
        state.locks.clone(),
        state.audit.clone(),
        state.term.clone(),
    )
}

fn emergency_service(state: &AppState) -> EmergencyService {
    EmergencyService::new(state.db.clone(), state.locks.clone(), state.audit.clone())
}

#[derive(Deserialize)]
struct SelectionRequest {
    user_id: String,
    course_id: String,
}

impl SelectionRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.user_id.is_empty() || self.course_id.is_empty() {
            return Err(AppError::BadRequest(
                "user id and course id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SelectionResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
    message: String,
}

#[derive(Deserialize)]
struct MineParams {
    user_id: String,
    status: Option<SelectionStatus>,
}

#[derive(Deserialize)]
struct HistoryParams {
    user_id: String,
    semester: Option<String>,
    academic_year: Option<String>,
}

#[derive(Deserialize)]
struct TimeConflictParams {
    user_id: String,
    course_id: String,
    exclude_course_id: Option<String>,
}

#[derive(Deserialize)]
struct PairParams {
    user_id: String,
    course_id: String,
}

#[derive(Deserialize)]
struct FavoriteListParams {
    user_id: String,
}

#[derive(Deserialize)]
struct AdjustRequest {
    admin_id: String,
    user_id: String,
    course_id: String,
    action: EmergencyAction,
    reason: String,
}

#[derive(Deserialize)]
struct BatchRequest {
    admin_id: String,
    operations: Vec<BatchOperation>,
    reason: String,
}

#[derive(Deserialize)]
struct StopRequest {
    admin_id: String,
    reason: String,
}

#[derive(Serialize)]
struct StopResponse {
    stopped_configs: u64,
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn selection_status(
    State(state): State<AppState>,
) -> Result<Json<SelectionPeriod>, AppError> {
    let period = selection_service(&state).selection_period().await?;
    Ok(Json(period))
}

async fn select_course(
    State(state): State<AppState>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<SelectionResponse>, AppError> {
    req.validate()?;
    let outcome = selection_service(&state)
        .select_course(&req.user_id, &req.course_id)
        .await?;
    Ok(Json(SelectionResponse {
        status: outcome.as_str(),
        message: outcome.message(),
    }))
}

async fn drop_course(
    State(state): State<AppState>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<OkResponse>, AppError> {
    req.validate()?;
    selection_service(&state)
        .drop_course(&req.user_id, &req.course_id)
        .await?;
    Ok(Json(OkResponse {
        ok: true,
        message: "course dropped".to_string(),
    }))
}

async fn my_selections(
    State(state): State<AppState>,
    Query(params): Query<MineParams>,
) -> Result<Json<MySelections>, AppError> {
    let selections = selection_service(&state)
        .my_selections(&params.user_id, params.status)
        .await?;
    Ok(Json(selections))
}

async fn selection_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SelectionHistoryEntry>>, AppError> {
    let history = selection_service(&state)
        .selection_history(
            &params.user_id,
            params.semester.as_deref(),
            params.academic_year.as_deref(),
        )
        .await?;
    Ok(Json(history))
}

async fn time_conflict(
    State(state): State<AppState>,
    Query(params): Query<TimeConflictParams>,
) -> Result<Json<ConflictCheck>, AppError> {
    let check = selection_service(&state)
        .check_time_conflict(
            &params.user_id,
            &params.course_id,
            params.exclude_course_id.as_deref(),
        )
        .await?;
    Ok(Json(check))
}

async fn credit_conflict(
    State(state): State<AppState>,
    Query(params): Query<PairParams>,
) -> Result<Json<ConflictCheck>, AppError> {
    let check = selection_service(&state)
        .check_credit_conflict(&params.user_id, &params.course_id)
        .await?;
    Ok(Json(check))
}

async fn list_favorites(
    State(state): State<AppState>,
    Query(params): Query<FavoriteListParams>,
) -> Result<Json<Vec<FavoriteCourse>>, AppError> {
    let favorites = selection_service(&state)
        .favorite_courses(&params.user_id)
        .await?;
    Ok(Json(favorites))
}

async fn add_favorite(
    State(state): State<AppState>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<OkResponse>, AppError> {
    req.validate()?;
    selection_service(&state)
        .favorite_course(&req.user_id, &req.course_id)
        .await?;
    Ok(Json(OkResponse {
        ok: true,
        message: "course favorited".to_string(),
    }))
}

async fn remove_favorite(
    State(state): State<AppState>,
    Query(params): Query<PairParams>,
) -> Result<StatusCode, AppError> {
    selection_service(&state)
        .unfavorite_course(&params.user_id, &params.course_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn admin_adjust(
    State(state): State<AppState>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<OkResponse>, AppError> {
    if req.admin_id.is_empty() || req.user_id.is_empty() || req.course_id.is_empty() {
        return Err(AppError::BadRequest(
            "admin id, user id and course id must not be empty".to_string(),
        ));
    }
    let message = emergency_service(&state)
        .adjust(
            &req.admin_id,
            &req.user_id,
            &req.course_id,
            req.action,
            &req.reason,
        )
        .await?;
    Ok(Json(OkResponse { ok: true, message }))
}

async fn admin_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchSummary>, AppError> {
    if req.admin_id.is_empty() {
        return Err(AppError::BadRequest("admin id must not be empty".to_string()));
    }
    let summary = emergency_service(&state)
        .batch_process(&req.admin_id, &req.operations, &req.reason)
        .await?;
    Ok(Json(summary))
}

async fn admin_stop(
    State(state): State<AppState>,
    Json(req): Json<StopRequest>,
) -> Result<Json<StopResponse>, AppError> {
    if req.admin_id.is_empty() {
        return Err(AppError::BadRequest("admin id must not be empty".to_string()));
    }
    let stopped = emergency_service(&state)
        .stop_selection(&req.admin_id, &req.reason)
        .await?;
    Ok(Json(StopResponse {
        stopped_configs: stopped,
    }))
}
