use crate::access::{AccessGate, Preferences, Session, SessionRegistry};
use crate::booking::{slot_options, BookingClock, BookingFlow, SlotOption};
use crate::messaging::Confirmation;
use crate::stores::members::MemberStore;
use crate::stores::reservations::{parse_date, ReservationStore};
use crate::views::{calendar, member_calendar, Calendar};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::*;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

pub const SESSION_HEADER: &str = "x-session-token";

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationStore>,
    pub members: Arc<MemberStore>,
    pub sessions: Arc<SessionRegistry>,
    pub public_base_url: String,
    pub photo_dir: PathBuf,
    /// Pins "now" for slot availability; `None` uses the local clock.
    pub fixed_clock: Option<BookingClock>,
}

impl AppState {
    fn clock(&self) -> BookingClock {
        self.fixed_clock.unwrap_or_else(BookingClock::now)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Acceso restringido")]
    Unauthorized,
    #[error("Solo los administradores pueden hacer esto")]
    Forbidden,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(StoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Remote(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        (status, Json(ActionResult::<()>::failed(self.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ActionResult<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ActionResult::ok(data)))
}

async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Session, ApiError> {
    let token = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(ApiError::Unauthorized)?;
    state.sessions.get(token).await.ok_or(ApiError::Unauthorized)
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Session, ApiError> {
    let session = require_session(state, headers).await?;
    if !session.is_admin() {
        return Err(ApiError::Forbidden);
    }
    Ok(session)
}

pub fn create_router(state: AppState) -> Router {
    let photos = ServeDir::new(state.photo_dir.clone());
    Router::new()
        .route("/health", get(health_check))
        .route("/tables", get(list_tables))
        .route("/tables/:id/slots", get(table_slots))
        .route("/access", post(unlock))
        .route("/session", get(current_session).delete(logout))
        .route("/session/preferences", put(update_preferences))
        .route("/reservations", get(admin_calendar))
        .route("/reservations/mine", get(my_reservations))
        .route("/reservations/today", get(todays_games))
        .route("/reservations/:id", delete(delete_reservation))
        .route("/bookings", post(create_booking))
        .route("/cancel", get(cancel_prompt).post(confirm_cancel))
        .route("/members", get(list_members).post(add_member))
        .route("/members/:id", patch(update_member).delete(delete_member))
        .route("/members/:id/photo", post(upload_photo))
        .nest_service("/photos", photos)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn health_check(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.members.health_check().await?;
    Ok("OK")
}

pub async fn list_tables() -> Json<Vec<Table>> {
    Json(TABLES.to_vec())
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub date: String,
}

pub async fn table_slots(
    State(state): State<AppState>,
    Path(table_id): Path<i32>,
    Query(query): Query<SlotQuery>,
) -> ApiResult<Vec<SlotOption>> {
    find_table(table_id)
        .ok_or_else(|| StoreError::NotFound(format!("Mesa desconocida: {table_id}")))?;
    let date = parse_date(&query.date)?;
    state.reservations.list().await?;
    ok(slot_options(&state.reservations, table_id, Some(date), state.clock()).await)
}

#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: Session,
    pub preferences: Preferences,
}

pub async fn unlock(
    State(state): State<AppState>,
    Json(request): Json<AccessRequest>,
) -> ApiResult<SessionResponse> {
    let mut gate = AccessGate::new();
    let session = gate
        .unlock(&request.code, &state.members, &state.sessions)
        .await?;
    let preferences = state.sessions.preferences(session.member.id).await;
    ok(SessionResponse { session, preferences })
}

pub async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<SessionResponse> {
    let session = require_session(&state, &headers).await?;
    let preferences = state.sessions.preferences(session.member.id).await;
    ok(SessionResponse { session, preferences })
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<()> {
    let session = require_session(&state, &headers).await?;
    state.sessions.revoke(session.token).await?;
    info!("Member {} logged out", session.member.id);
    ok(())
}

pub async fn update_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(preferences): Json<Preferences>,
) -> ApiResult<Preferences> {
    let session = require_session(&state, &headers).await?;
    state
        .sessions
        .set_preferences(session.member.id, preferences)
        .await?;
    ok(preferences)
}

pub async fn admin_calendar(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Calendar> {
    require_admin(&state, &headers).await?;
    ok(calendar(state.reservations.list().await?))
}

pub async fn my_reservations(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Calendar> {
    let session = require_session(&state, &headers).await?;
    let reservations = state.reservations.list().await?;
    ok(member_calendar(reservations, &session.member.id.to_string()))
}

pub async fn todays_games(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Reservation>> {
    require_session(&state, &headers).await?;
    ok(state.reservations.by_date(state.clock().today).await?)
}

pub async fn delete_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    require_admin(&state, &headers).await?;
    state.reservations.delete(id).await?;
    ok(())
}

#[derive(Debug, Deserialize)]
pub struct BookingRequest {
    pub table_id: i32,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub mobile: String,
    pub name: Option<String>,
    pub member_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub reservation: Reservation,
    pub confirmation: Confirmation,
}

pub async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> ApiResult<BookingResponse> {
    let session = require_session(&state, &headers).await?;
    let clock = state.clock();
    state.reservations.list().await?;

    let mut flow = BookingFlow::open(request.table_id, clock)?;
    flow.set_date(&request.date);
    let member_id = session.member.id.to_string();
    flow.set_identity(
        request.name.as_deref().unwrap_or(&session.member.name),
        request.member_id.as_deref().unwrap_or(&member_id),
        &request.mobile,
    );
    if !request.time.trim().is_empty() {
        flow.select_slot(request.time.trim(), &state.reservations, clock)
            .await?;
    }
    flow.advance()?;

    let confirmation = flow.submit(&state.reservations, &state.public_base_url).await?;
    let reservation = flow
        .created()
        .cloned()
        .ok_or_else(|| StoreError::Remote("Reserva no registrada".to_string()))?;
    ok(BookingResponse {
        reservation,
        confirmation,
    })
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    pub cancel: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelPrompt {
    pub question: &'static str,
    pub reservation: Reservation,
}

pub async fn cancel_prompt(
    State(state): State<AppState>,
    Query(query): Query<CancelQuery>,
) -> ApiResult<CancelPrompt> {
    let reservation = state.reservations.get(query.cancel).await?;
    ok(CancelPrompt {
        question: "¿Seguro que quieres cancelar tu reserva?",
        reservation,
    })
}

pub async fn confirm_cancel(
    State(state): State<AppState>,
    Query(query): Query<CancelQuery>,
) -> ApiResult<&'static str> {
    state.reservations.get(query.cancel).await?;
    state.reservations.delete(query.cancel).await?;
    ok("Reserva cancelada con éxito.")
}

pub async fn list_members(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Member>> {
    require_admin(&state, &headers).await?;
    ok(state.members.list().await?)
}

#[derive(Debug, Deserialize)]
pub struct NewMemberRequest {
    #[serde(default)]
    pub name: String,
}

pub async fn add_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewMemberRequest>,
) -> ApiResult<Member> {
    require_admin(&state, &headers).await?;
    ok(state.members.add(&request.name).await?)
}

/// Admins may edit anyone; members may edit their own name and photo.
fn authorize_member_edit(session: &Session, id: Uuid, update: &MemberUpdate) -> Result<(), ApiError> {
    if session.is_admin() {
        return Ok(());
    }
    if session.member.id != id || update.is_admin.is_some() {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

pub async fn update_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(update): Json<MemberUpdate>,
) -> ApiResult<Member> {
    let session = require_session(&state, &headers).await?;
    authorize_member_edit(&session, id, &update)?;
    let member = state.members.update(id, update).await?;
    state.sessions.refresh_member(&member).await?;
    ok(member)
}

pub async fn delete_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    require_admin(&state, &headers).await?;
    state.members.delete(id).await?;
    state.sessions.revoke_member(id).await?;
    ok(())
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    pub file_name: String,
}

pub async fn upload_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<PhotoQuery>,
    body: Bytes,
) -> ApiResult<Member> {
    let session = require_session(&state, &headers).await?;
    authorize_member_edit(&session, id, &MemberUpdate::default())?;
    let member = state.members.upload_photo(id, &query.file_name, &body).await?;
    state.sessions.refresh_member(&member).await?;
    ok(member)
}
