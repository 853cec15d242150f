use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use validator::Validate;

use crate::dto::session_dto::{
    AckResponse, CreateSessionRequest, ListSessionsQuery, ListSessionsResponse, SessionResponse,
    SubmitAnswerRequest,
};
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::session::{SessionFilter, SessionStatus};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;

const DEFAULT_PER_PAGE: i64 = 20;

#[axum::debug_handler]
pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<Response> {
    let user_id = claims.user_id()?;
    if !state.quota_guard.allow_create(user_id) {
        return Err(Error::QuotaExceeded(
            "Too many sessions started recently; try again later".to_string(),
        ));
    }

    let svc = &state.session_service;
    let session = svc.create(user_id, req).await?;
    let remaining = svc.time_guard().seconds_remaining(&session);
    let body = SessionResponse::new(session, remaining).with_answered_count(0);
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListSessionsQuery>,
) -> Result<Json<ListSessionsResponse>> {
    query.validate()?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
    let filter = SessionFilter {
        user_id: query.user_id,
        status: query.status,
        page,
        per_page,
    };

    let svc = &state.session_service;
    let (sessions, total) = svc.list(&filter).await?;
    let items = sessions
        .into_iter()
        .map(|s| {
            let remaining = svc.time_guard().seconds_remaining(&s);
            SessionResponse::new(s, remaining)
        })
        .collect();

    Ok(Json(ListSessionsResponse {
        items,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    }))
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<SessionResponse>> {
    let snapshot = state.session_service.get(&token).await?;
    Ok(Json(
        SessionResponse::new(snapshot.session, snapshot.time_remaining_seconds)
            .with_answered_count(snapshot.answered_count),
    ))
}

#[axum::debug_handler]
pub async fn get_questions(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<Response> {
    let sheet = state.session_service.questions(&token).await?;
    Ok(Json(sheet).into_response())
}

#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    ApiPath((token, sequence)): ApiPath<(String, i32)>,
    ApiJson(req): ApiJson<SubmitAnswerRequest>,
) -> Result<Response> {
    let saved = state
        .session_service
        .submit_answer(&token, sequence, &req.answer)
        .await?;
    Ok(Json(saved).into_response())
}

#[axum::debug_handler]
pub async fn clear_answer(
    State(state): State<AppState>,
    ApiPath((token, sequence)): ApiPath<(String, i32)>,
) -> Result<Json<AckResponse>> {
    state.session_service.clear_answer(&token, sequence).await?;
    Ok(Json(AckResponse {
        ok: true,
        status: None,
    }))
}

#[axum::debug_handler]
pub async fn complete_session(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<SessionResponse>> {
    let session = state.session_service.complete(&token).await?;
    Ok(Json(SessionResponse::new(session, 0)))
}

#[axum::debug_handler]
pub async fn cancel_session(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<AckResponse>> {
    state.session_service.cancel(&token).await?;
    Ok(Json(AckResponse {
        ok: true,
        status: Some(SessionStatus::Cancelled),
    }))
}

#[axum::debug_handler]
pub async fn get_detail(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<Response> {
    let detail = state.session_service.detail(&token).await?;
    Ok(Json(detail).into_response())
}
