//! HTTP surface.
//!
//! Handlers stay thin: extract the authenticated practitioner, enforce
//! ownership, delegate to the domain modules and shape the response.
//! Missing and foreign records answer the same 404 so the API never
//! confirms that someone else's record exists.

use std::sync::Arc;

use axum::extract::{FromRef, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::auth::{AuthUser, JwtSecret};
use crate::cfp::{self, CfpClient};
use crate::copilot::{self, ConversationLocks};
use crate::documents::{self, DocumentType};
use crate::error::ApiError;
use crate::llm::ChatModel;
use crate::models::{
    ConversationRecord, MessageRecord, NewSession, PatientOwner, PatientRecord, ProfileRecord,
    SessionRecord,
};
use crate::pdf;
use crate::reports;
use crate::subscription;
use crate::supabase::SupabaseClient;

#[derive(Clone)]
pub struct AppState {
    pub db: SupabaseClient,
    pub llm: Arc<dyn ChatModel>,
    pub cfp: Arc<CfpClient>,
    pub locks: Arc<ConversationLocks>,
    pub jwt_secret: JwtSecret,
}

impl FromRef<AppState> for JwtSecret {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_secret.clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/analyze", post(analyze_transcription))
        .route("/analyze-text", post(analyze_text))
        .route("/save-session", post(save_session))
        .route("/save-text-session", post(save_text_session))
        .route("/patient/:patient_id", get(get_patient))
        .route("/patient/:patient_id/sessions", get(get_patient_sessions))
        .route("/session/:session_id", get(get_session))
        .route("/session/:session_id/record", get(get_session_record))
        .route("/api/patients/:patient_id/reports", get(patient_report))
        .route("/copilot/chat", post(copilot_chat))
        .route("/copilot/conversations", get(list_conversations))
        .route(
            "/copilot/conversations/:conversation_id/messages",
            get(conversation_messages),
        )
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/validate-crp", post(validate_crp))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "message": "TheraMind API is running" }))
}

// -- Ownership helpers --

async fn owned_patient(
    db: &SupabaseClient,
    actor: &AuthUser,
    patient_id: Uuid,
) -> Result<PatientRecord, ApiError> {
    let patient: Option<PatientRecord> = db
        .from("patients")
        .select("*")
        .eq("id", &patient_id.to_string())
        .fetch_one()
        .await?;
    match patient {
        Some(p) if p.user_id == actor.user_id => Ok(p),
        _ => Err(ApiError::NotFound("Paciente não encontrado".to_string())),
    }
}

/// Ownership check that only pulls the owner column, for write paths
/// that never read the record back
async fn assert_patient_owned(
    db: &SupabaseClient,
    actor: &AuthUser,
    patient_id: Uuid,
) -> Result<(), ApiError> {
    let owner: Option<PatientOwner> = db
        .from("patients")
        .select("id,user_id")
        .eq("id", &patient_id.to_string())
        .fetch_one()
        .await?;
    match owner {
        Some(o) if o.user_id == actor.user_id => Ok(()),
        _ => Err(ApiError::NotFound("Paciente não encontrado".to_string())),
    }
}

async fn owned_session(
    db: &SupabaseClient,
    actor: &AuthUser,
    session_id: Uuid,
) -> Result<(SessionRecord, PatientRecord), ApiError> {
    let session: Option<SessionRecord> = db
        .from("sessions")
        .select("*")
        .eq("id", &session_id.to_string())
        .fetch_one()
        .await?;
    let Some(session) = session else {
        return Err(ApiError::NotFound("Sessão não encontrada".to_string()));
    };
    let patient = owned_patient(db, actor, session.patient_id)
        .await
        .map_err(|_| ApiError::NotFound("Sessão não encontrada".to_string()))?;
    Ok((session, patient))
}

async fn load_profile(
    db: &SupabaseClient,
    actor: &AuthUser,
) -> Result<Option<ProfileRecord>, ApiError> {
    Ok(db
        .from("profiles")
        .select("*")
        .eq("id", &actor.user_id.to_string())
        .fetch_one()
        .await?)
}

fn pdf_response(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            ("content-type".to_string(), "application/pdf".to_string()),
            (
                "content-disposition".to_string(),
                format!("attachment; filename={}", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}

// -- Session analysis --

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub transcription: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeTextRequest {
    pub text: String,
}

async fn analyze_transcription(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<documents::SessionAnalysis>, ApiError> {
    run_analysis(&state, &user, "Transcrição", &body.transcription).await
}

async fn analyze_text(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<AnalyzeTextRequest>,
) -> Result<Json<documents::SessionAnalysis>, ApiError> {
    run_analysis(&state, &user, "Texto", &body.text).await
}

async fn run_analysis(
    state: &AppState,
    user: &AuthUser,
    label: &str,
    text: &str,
) -> Result<Json<documents::SessionAnalysis>, ApiError> {
    if !subscription::check_feature(user.user_id, "ai_analysis") {
        return Err(ApiError::BadRequest("Recurso não disponível no seu plano".to_string()));
    }
    if text.chars().count() < 10 {
        return Err(ApiError::BadRequest(
            "O conteúdo da sessão deve ter pelo menos 10 caracteres.".to_string(),
        ));
    }

    let profile = load_profile(&state.db, user).await?;
    let approach = documents::approach_of(profile.as_ref());

    let analysis = documents::analyze_session_text(state.llm.as_ref(), &approach, label, text)
        .await
        .map_err(|e| {
            error!("Erro análise: {}", e);
            ApiError::from(e)
        })?;
    Ok(Json(analysis))
}

// -- Session persistence --

/// Accepts both the structured record fields and the legacy
/// summary/insights/themes triple older clients still send
#[derive(Debug, Deserialize)]
pub struct SaveSessionRequest {
    pub patient_id: Uuid,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub insights: Option<String>,
    #[serde(default)]
    pub themes: Option<Vec<String>>,
    #[serde(default)]
    pub registro_descritivo: Option<String>,
    #[serde(default)]
    pub hipoteses_clinicas: Option<String>,
    #[serde(default)]
    pub direcoes_intervencao: Option<String>,
    #[serde(default)]
    pub temas_relevantes: Option<Vec<String>>,
}

fn session_row(body: SaveSessionRequest, transcription: String, audio_url: Option<String>) -> NewSession {
    let registro = body
        .registro_descritivo
        .or(body.summary)
        .unwrap_or_default();
    let hipoteses = match (body.hipoteses_clinicas, body.insights) {
        (Some(hipoteses), _) => hipoteses,
        (None, Some(insights)) => insights,
        (None, None) => String::new(),
    };
    let direcoes = body.direcoes_intervencao.unwrap_or_default();
    let temas = body.temas_relevantes.or(body.themes).unwrap_or_default();

    NewSession {
        patient_id: body.patient_id,
        audio_url,
        transcription,
        summary: registro.clone(),
        insights: documents::legacy_insights(&hipoteses, &direcoes, &temas),
        themes: temas,
        registro_descritivo: registro,
        hipoteses_clinicas: hipoteses,
        direcoes_intervencao: direcoes,
    }
}

async fn save_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SaveSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    assert_patient_owned(&state.db, &user, body.patient_id).await?;

    let transcription = body.transcription.clone().unwrap_or_default();
    let audio_url = body.audio_url.clone();
    let row = session_row(body, transcription, audio_url);

    let created: SessionRecord = state.db.insert("sessions", &row).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": created.id }))))
}

async fn save_text_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SaveSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    assert_patient_owned(&state.db, &user, body.patient_id).await?;

    let transcription = body.text.clone().unwrap_or_default();
    let row = session_row(body, transcription, None);

    let created: SessionRecord = state.db.insert("sessions", &row).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": created.id }))))
}

// -- Patient and session reads --

async fn get_patient(
    State(state): State<AppState>,
    user: AuthUser,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<PatientRecord>, ApiError> {
    Ok(Json(owned_patient(&state.db, &user, patient_id).await?))
}

async fn get_patient_sessions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    assert_patient_owned(&state.db, &user, patient_id).await?;

    let sessions: Vec<SessionRecord> = state
        .db
        .from("sessions")
        .select("*")
        .eq("patient_id", &patient_id.to_string())
        .order("created_at", true)
        .fetch()
        .await?;
    Ok(Json(json!({ "sessions": sessions })))
}

async fn get_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionRecord>, ApiError> {
    let (session, _) = owned_session(&state.db, &user, session_id).await?;
    Ok(Json(session))
}

// -- Clinical documents --

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
}

fn default_format() -> String {
    "pdf".to_string()
}

fn default_document_type() -> String {
    "registro_documental".to_string()
}

async fn get_session_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
    Query(query): Query<RecordQuery>,
) -> Result<Response, ApiError> {
    let (session, patient) = owned_session(&state.db, &user, session_id).await?;
    let profile = load_profile(&state.db, &user).await?;
    let approach = documents::approach_of(profile.as_ref());
    let document_type = DocumentType::from_slug(&query.document_type);

    let content = documents::compose_document(
        state.llm.as_ref(),
        document_type,
        &session,
        &patient,
        &approach,
    )
    .await?;

    if query.format == "json" {
        return Ok(Json(content.to_json()).into_response());
    }

    let session_date = session.created_at.format("%d/%m/%Y").to_string();
    let bytes = pdf::render_clinical_document(
        document_type,
        &content,
        &patient,
        &session_date,
        profile.as_ref(),
    )
    .map_err(|e| {
        error!("Erro ao gerar documento {}: {}", document_type.slug(), e);
        ApiError::Internal("Erro ao gerar documento".to_string())
    })?;

    let short_id = session_id.to_string().chars().take(8).collect::<String>();
    let filename = format!("{}_{}.pdf", document_type.slug(), short_id);
    Ok(pdf_response(bytes, &filename))
}

// -- Evolution reports --

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_report_type")]
    pub report_type: String,
}

fn default_report_type() -> String {
    "summary".to_string()
}

async fn patient_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(patient_id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let patient = owned_patient(&state.db, &user, patient_id).await?;

    let mut sessions_query = state
        .db
        .from("sessions")
        .select("*")
        .eq("patient_id", &patient_id.to_string());
    if let Some(start) = query.start_date {
        sessions_query = sessions_query.gte("created_at", &start.to_rfc3339());
    }
    if let Some(end) = query.end_date {
        sessions_query = sessions_query.lte("created_at", &end.to_rfc3339());
    }
    let sessions: Vec<SessionRecord> = sessions_query.fetch().await?;

    let report =
        reports::build_patient_report(patient, &sessions, query.start_date, query.end_date);

    if query.report_type == "pdf" {
        let bytes = pdf::render_patient_report(&report).map_err(|e| {
            error!("Erro ao gerar relatório: {}", e);
            ApiError::Internal("Erro ao gerar relatório em PDF".to_string())
        })?;
        return Ok(pdf_response(bytes, &format!("relatorio_{}.pdf", patient_id)));
    }

    Ok(Json(report).into_response())
}

// -- Copilot --

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: Uuid,
    pub reply: String,
}

async fn copilot_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = copilot::run_chat(
        &state.db,
        &state.llm,
        &state.locks,
        &user,
        body.conversation_id,
        &body.message,
    )
    .await?;
    Ok(Json(ChatResponse {
        conversation_id: outcome.conversation_id,
        reply: outcome.reply,
    }))
}

async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ConversationRecord>>, ApiError> {
    let conversations: Vec<ConversationRecord> = state
        .db
        .from("copilot_conversations")
        .select("*")
        .eq("user_id", &user.user_id.to_string())
        .order("updated_at", true)
        .fetch()
        .await?;
    Ok(Json(conversations))
}

async fn conversation_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let conversation: Option<ConversationRecord> = state
        .db
        .from("copilot_conversations")
        .select("*")
        .eq("id", &conversation_id.to_string())
        .fetch_one()
        .await?;
    match conversation {
        Some(c) if c.user_id == user.user_id => {}
        _ => return Err(ApiError::NotFound("Conversa não encontrada".to_string())),
    }

    let messages: Vec<MessageRecord> = state
        .db
        .from("copilot_messages")
        .select("*")
        .eq("conversation_id", &conversation_id.to_string())
        .order("created_at", false)
        .fetch()
        .await?;
    Ok(Json(messages))
}

// -- Profile --

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crp: Option<String>,
    #[serde(default)]
    pub theoretical_approach: Option<String>,
    #[serde(default)]
    pub recovery_email: Option<String>,
}

async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProfileRecord>, ApiError> {
    match load_profile(&state.db, &user).await? {
        Some(profile) => Ok(Json(profile)),
        None => Err(ApiError::NotFound("Perfil não encontrado".to_string())),
    }
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<ProfileRecord>, ApiError> {
    let mut patch = serde_json::Map::new();
    if let Some(name) = body.name {
        patch.insert("name".to_string(), json!(name));
    }
    if let Some(crp) = body.crp {
        patch.insert("crp".to_string(), json!(crp));
    }
    if let Some(approach) = body.theoretical_approach {
        patch.insert("theoretical_approach".to_string(), json!(approach));
    }
    if let Some(email) = body.recovery_email {
        patch.insert("recovery_email".to_string(), json!(email));
    }
    patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

    let updated: Vec<ProfileRecord> = state
        .db
        .update(
            "profiles",
            &serde_json::Value::Object(patch),
            ("id", &user.user_id.to_string()),
        )
        .await?;
    updated
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::Internal("Erro ao atualizar perfil".to_string()))
}

// -- CRP validation --

#[derive(Debug, Deserialize)]
pub struct CrpValidationRequest {
    pub crp: String,
}

#[derive(Debug, Serialize)]
pub struct CrpValidationResponse {
    pub valid: bool,
    pub exists_in_theramind: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Open endpoint: onboarding validates the CRP before the account exists
async fn validate_crp(
    State(state): State<AppState>,
    Json(body): Json<CrpValidationRequest>,
) -> Result<Json<CrpValidationResponse>, ApiError> {
    let crp_input = body.crp.trim();

    let existing: Vec<serde_json::Value> = state
        .db
        .from("profiles")
        .select("id")
        .eq("crp", crp_input)
        .fetch()
        .await?;
    let exists_in_theramind = !existing.is_empty();

    let Some((uf, registro)) = cfp::parse_crp_input(crp_input) else {
        return Ok(Json(CrpValidationResponse {
            valid: false,
            exists_in_theramind,
            professional_name: None,
            error: Some(
                "Formato de CRP inválido. Use o padrão 'Região/Número' (ex: 04/44606).".to_string(),
            ),
        }));
    };

    // A duplicate inside the platform is blocked without the external call
    if exists_in_theramind {
        return Ok(Json(CrpValidationResponse {
            valid: true,
            exists_in_theramind: true,
            professional_name: None,
            error: Some(
                "Este CRP já está vinculado a outro profissional no Theramind.".to_string(),
            ),
        }));
    }

    let lookup = state.cfp.lookup(&registro, &uf).await;
    Ok(Json(CrpValidationResponse {
        valid: lookup.valid,
        exists_in_theramind: false,
        professional_name: lookup.name,
        error: lookup.error,
    }))
}
