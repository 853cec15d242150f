#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value as JsonValue;
use tower::ServiceExt;
use uuid::Uuid;

use exam_session_backend::database::memory::{MemoryQuestionCatalog, MemorySessionStore};
use exam_session_backend::middleware::auth::Claims;
use exam_session_backend::models::question::{
    ChoiceOption, DragDropDetails, DragItem, DropSlot, Question, QuestionDetails,
    SingleChoiceDetails,
};
use exam_session_backend::routes::build_router;
use exam_session_backend::services::quota_service::{QuotaGuard, Unlimited};
use exam_session_backend::utils::time::ManualClock;
use exam_session_backend::AppState;

pub const JWT_SECRET: &str = "test_secret_key";

pub const SUBJECT: i64 = 1;
pub const LEVEL: i64 = 1;
/// Two single-choice questions: 1 (key A) and 2 (key B).
pub const TOPIC_CHOICE: i64 = 100;
/// One drag-drop question: 10, items 1..=4 belong in slots 11..=14.
pub const TOPIC_DRAG: i64 = 200;

pub struct Harness {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemorySessionStore>,
    pub catalog: Arc<MemoryQuestionCatalog>,
    pub clock: Arc<ManualClock>,
}

pub async fn harness() -> Harness {
    harness_with_quota(Arc::new(Unlimited)).await
}

pub async fn harness_with_quota(quota: Arc<dyn QuotaGuard>) -> Harness {
    let store = Arc::new(MemorySessionStore::new());
    let catalog = Arc::new(MemoryQuestionCatalog::new());
    let clock = Arc::new(ManualClock::default());
    seed_catalog(&catalog).await;

    let state = AppState::new(
        store.clone(),
        catalog.clone(),
        clock.clone(),
        quota,
        JWT_SECRET,
    );
    Harness {
        router: build_router(state.clone()),
        state,
        store,
        catalog,
        clock,
    }
}

pub fn single_choice(id: i64, topic_id: i64, correct: ChoiceOption) -> Question {
    Question {
        id,
        subject_id: SUBJECT,
        level_id: LEVEL,
        topic_id: Some(topic_id),
        prompt: format!("Question {}", id),
        details: QuestionDetails::SingleChoice(SingleChoiceDetails {
            options: [
                "first".to_string(),
                "second".to_string(),
                "third".to_string(),
                "fourth".to_string(),
            ],
            correct_option: correct,
        }),
    }
}

pub fn drag_drop(id: i64, topic_id: i64) -> Question {
    let items = (1..=4)
        .map(|i| DragItem {
            id: i,
            label: format!("item {}", i),
        })
        .collect();
    let slots = (11..=14)
        .map(|s| DropSlot {
            id: s,
            label: format!("slot {}", s),
        })
        .collect();
    let correct_mapping: BTreeMap<i64, i64> = (1..=4).map(|i| (i, i + 10)).collect();
    Question {
        id,
        subject_id: SUBJECT,
        level_id: LEVEL,
        topic_id: Some(topic_id),
        prompt: "Match the items".to_string(),
        details: QuestionDetails::DragDrop(DragDropDetails {
            items,
            slots,
            correct_mapping,
        }),
    }
}

pub async fn seed_catalog(catalog: &MemoryQuestionCatalog) {
    catalog.insert(single_choice(1, TOPIC_CHOICE, ChoiceOption::A)).await;
    catalog.insert(single_choice(2, TOPIC_CHOICE, ChoiceOption::B)).await;
    catalog.insert(drag_drop(10, TOPIC_DRAG)).await;
}

pub fn bearer(user_id: Uuid, role: Option<&str>) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        role: role.map(str::to_string),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode jwt")
}

pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}
