//! Shared test harness: an in-process PostgREST stand-in, a scripted chat
//! model and request helpers for exercising the router end to end.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use theramind_api::auth::JwtSecret;
use theramind_api::cfp::CfpClient;
use theramind_api::copilot::ConversationLocks;
use theramind_api::llm::{
    ChatMessage, ChatModel, FunctionDeclaration, LlmError, ModelTurn, ToolCallRequest,
};
use theramind_api::routes::AppState;
use theramind_api::supabase::SupabaseClient;

// -- In-memory PostgREST stand-in --

#[derive(Clone, Default)]
pub struct StubDb {
    tables: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    clock: Arc<AtomicI64>,
}

impl StubDb {
    /// Seed a row directly, assigning id/created_at like an insert would
    pub fn seed(&self, table: &str, mut row: Value) -> Value {
        self.decorate(&mut row);
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        row
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn decorate(&self, row: &mut Value) {
        let object = row.as_object_mut().expect("row must be an object");
        if !object.contains_key("id") {
            object.insert("id".to_string(), json!(Uuid::new_v4()));
        }
        if !object.contains_key("created_at") {
            let tick = self.clock.fetch_add(1, Ordering::SeqCst);
            let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(tick);
            object.insert("created_at".to_string(), json!(stamp.to_rfc3339()));
        }
    }
}

fn field_as_string(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn apply_filters(mut rows: Vec<Value>, params: &[(String, String)]) -> Vec<Value> {
    for (key, value) in params {
        if key == "select" {
            continue;
        }
        if key == "order" {
            let (column, direction) = value.split_once('.').unwrap_or((value.as_str(), "asc"));
            let column = column.to_string();
            rows.sort_by(|a, b| field_as_string(a, &column).cmp(&field_as_string(b, &column)));
            if direction == "desc" {
                rows.reverse();
            }
            continue;
        }
        if key == "limit" {
            if let Ok(limit) = value.parse::<usize>() {
                rows.truncate(limit);
            }
            continue;
        }
        if let Some(expected) = value.strip_prefix("eq.") {
            let expected = expected.to_string();
            rows.retain(|row| field_as_string(row, key) == expected);
        } else if let Some(pattern) = value.strip_prefix("ilike.") {
            let needle = pattern.trim_matches('*').to_lowercase();
            rows.retain(|row| field_as_string(row, key).to_lowercase().contains(&needle));
        } else if let Some(bound) = value.strip_prefix("gte.") {
            let bound = bound.to_string();
            rows.retain(|row| field_as_string(row, key) >= bound);
        } else if let Some(bound) = value.strip_prefix("lte.") {
            let bound = bound.to_string();
            rows.retain(|row| field_as_string(row, key) <= bound);
        }
    }
    rows
}

async fn query_table(
    State(db): State<StubDb>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<Vec<Value>> {
    Json(apply_filters(db.rows(&table), &params))
}

async fn insert_table(
    State(db): State<StubDb>,
    Path(table): Path<String>,
    Json(row): Json<Value>,
) -> (StatusCode, Json<Vec<Value>>) {
    let stored = db.seed(&table, row);
    (StatusCode::CREATED, Json(vec![stored]))
}

async fn patch_table(
    State(db): State<StubDb>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    Json(patch): Json<Value>,
) -> Json<Vec<Value>> {
    let mut tables = db.tables.lock().unwrap();
    let rows = tables.entry(table).or_default();
    let mut updated = Vec::new();

    for row in rows.iter_mut() {
        let matches = params.iter().all(|(key, value)| match value.strip_prefix("eq.") {
            Some(expected) => field_as_string(row, key) == expected,
            None => true,
        });
        if matches {
            if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                for (key, value) in changes {
                    target.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
    }
    Json(updated)
}

async fn cfp_search(Json(payload): Json<Value>) -> Json<Vec<Value>> {
    let registro = payload.get("registro").and_then(|v| v.as_str()).unwrap_or("");
    if registro == "44606" {
        Json(vec![json!({
            "Nome": "ISA LETICIA MELO",
            "situacao": "ATIVO",
            "nomeregional": "CRP-04"
        })])
    } else {
        Json(Vec::new())
    }
}

/// Bound addresses of the stub backend
pub struct StubBackend {
    pub db: StubDb,
    pub supabase: SupabaseClient,
    pub cfp_url: String,
}

pub async fn spawn_backend() -> StubBackend {
    let db = StubDb::default();
    let app = Router::new()
        .route(
            "/rest/v1/:table",
            get(query_table).post(insert_table).patch(patch_table),
        )
        .route("/cfp", post(cfp_search))
        .with_state(db.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let supabase = SupabaseClient::new(&format!("http://{}", addr), "test-key").unwrap();
    StubBackend {
        db,
        supabase,
        cfp_url: format!("http://{}/cfp", addr),
    }
}

// -- Scripted chat model --

#[derive(Default)]
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ModelTurn>>,
    /// Returned when the scripted turns run out; lets a test model a
    /// runaway tool loop
    fallback_turn: Mutex<Option<ModelTurn>>,
    fail_chat: Mutex<bool>,
    json_replies: Mutex<VecDeque<Value>>,
    text_replies: Mutex<VecDeque<String>>,
    pub chat_calls: AtomicUsize,
    /// Every tool-result string the model has been shown
    pub seen_tool_results: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: &str) {
        self.turns.lock().unwrap().push_back(ModelTurn {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
        });
    }

    pub fn push_tool_call(&self, name: &str, args: Value) {
        self.turns.lock().unwrap().push_back(ModelTurn {
            text: None,
            tool_calls: vec![ToolCallRequest {
                name: name.to_string(),
                args,
            }],
        });
    }

    pub fn always_tool_call(&self, name: &str, args: Value) {
        *self.fallback_turn.lock().unwrap() = Some(ModelTurn {
            text: None,
            tool_calls: vec![ToolCallRequest {
                name: name.to_string(),
                args,
            }],
        });
    }

    pub fn fail_chat(&self) {
        *self.fail_chat.lock().unwrap() = true;
    }

    pub fn push_json(&self, value: Value) {
        self.json_replies.lock().unwrap().push_back(value);
    }

    pub fn push_generated_text(&self, text: &str) {
        self.text_replies.lock().unwrap().push_back(text.to_string());
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(
        &self,
        _system: &str,
        history: &[ChatMessage],
        _tools: &[FunctionDeclaration],
    ) -> Result<ModelTurn, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);

        for entry in history {
            if let ChatMessage::ToolResults(results) = entry {
                let mut seen = self.seen_tool_results.lock().unwrap();
                for result in results {
                    if !seen.contains(&result.output) {
                        seen.push(result.output.clone());
                    }
                }
            }
        }

        if *self.fail_chat.lock().unwrap() {
            return Err(LlmError::Api {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "scripted failure".to_string(),
            });
        }

        if let Some(turn) = self.turns.lock().unwrap().pop_front() {
            return Ok(turn);
        }
        if let Some(turn) = self.fallback_turn.lock().unwrap().clone() {
            return Ok(turn);
        }
        Err(LlmError::EmptyResponse)
    }

    async fn generate_json(&self, _prompt: &str) -> Result<Value, LlmError> {
        Ok(self
            .json_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| json!({})))
    }

    async fn generate_text(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(self
            .text_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Conversa com o copiloto".to_string()))
    }
}

// -- App and request helpers --

pub const TEST_SECRET: &str = "test-jwt-secret";

pub fn app_state(backend: &StubBackend, model: Arc<ScriptedModel>) -> AppState {
    AppState {
        db: backend.supabase.clone(),
        llm: model,
        cfp: Arc::new(CfpClient::new(&backend.cfp_url).expect("cfp client")),
        locks: Arc::new(ConversationLocks::default()),
        jwt_secret: JwtSecret(TEST_SECRET.to_string()),
    }
}

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    email: String,
    aud: String,
    exp: i64,
}

pub fn token_for(user_id: Uuid) -> String {
    let claims = TestClaims {
        sub: user_id.to_string(),
        email: "psi@example.com".to_string(),
        aud: "authenticated".to_string(),
        exp: Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

pub async fn request(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

pub async fn request_json(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = request(app, method, path, token, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}
