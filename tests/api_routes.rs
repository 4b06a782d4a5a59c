//! Route-level tests: authentication, ownership scoping, session
//! persistence, documents, reports, profile and CRP validation.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{app_state, request, request_json, spawn_backend, token_for, ScriptedModel};
use theramind_api::routes;

#[tokio::test]
async fn health_check_is_open() {
    let backend = spawn_backend().await;
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "TheraMind API is running");
}

#[tokio::test]
async fn protected_routes_require_token() {
    let backend = spawn_backend().await;
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, _) = request_json(
        &app,
        "GET",
        &format!("/patient/{}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn patient_read_is_scoped_to_owner() {
    let backend = spawn_backend().await;
    let owner = Uuid::new_v4();
    let patient = backend.db.seed(
        "patients",
        json!({ "user_id": owner, "name": "Maria", "email": "maria@x.com" }),
    );
    let patient_id = patient["id"].as_str().unwrap();
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/patient/{}", patient_id),
        Some(&token_for(owner)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Maria");

    // Someone else's patient answers like a missing one
    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/patient/{}", patient_id),
        Some(&token_for(Uuid::new_v4())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Paciente não encontrado");

    let (status, _) = request_json(
        &app,
        "GET",
        &format!("/patient/{}", Uuid::new_v4()),
        Some(&token_for(owner)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn save_session_persists_structured_fields() {
    let backend = spawn_backend().await;
    let owner = Uuid::new_v4();
    let patient = backend.db.seed("patients", json!({ "user_id": owner, "name": "Maria" }));
    let patient_id = patient["id"].as_str().unwrap();
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(
        &app,
        "POST",
        "/save-session",
        Some(&token_for(owner)),
        Some(json!({
            "patient_id": patient_id,
            "transcription": "fala completa da sessão",
            "registro_descritivo": "Observa-se relato de tensão no trabalho.",
            "hipoteses_clinicas": "Levanta-se hipótese de sobrecarga.",
            "direcoes_intervencao": "Sugere-se explorar limites.",
            "temas_relevantes": ["trabalho", "estresse"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].is_string());

    let sessions = backend.db.rows("sessions");
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session["registro_descritivo"], "Observa-se relato de tensão no trabalho.");
    assert_eq!(session["summary"], "Observa-se relato de tensão no trabalho.");
    assert_eq!(session["themes"], json!(["trabalho", "estresse"]));
    assert!(session["insights"]
        .as_str()
        .unwrap()
        .contains("Temas recorrentes: trabalho, estresse"));
}

#[tokio::test]
async fn save_session_rejects_foreign_patient() {
    let backend = spawn_backend().await;
    let patient = backend.db.seed(
        "patients",
        json!({ "user_id": Uuid::new_v4(), "name": "Maria" }),
    );
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, _) = request_json(
        &app,
        "POST",
        "/save-session",
        Some(&token_for(Uuid::new_v4())),
        Some(json!({
            "patient_id": patient["id"],
            "transcription": "texto"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(backend.db.rows("sessions").is_empty());
}

#[tokio::test]
async fn patient_sessions_are_listed_newest_first() {
    let backend = spawn_backend().await;
    let owner = Uuid::new_v4();
    let patient = backend.db.seed("patients", json!({ "user_id": owner, "name": "Maria" }));
    let patient_id = patient["id"].as_str().unwrap();
    backend.db.seed(
        "sessions",
        json!({ "patient_id": patient_id, "transcription": "primeira" }),
    );
    backend.db.seed(
        "sessions",
        json!({ "patient_id": patient_id, "transcription": "segunda" }),
    );
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/patient/{}/sessions", patient_id),
        Some(&token_for(owner)),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["transcription"], "segunda");
    assert_eq!(sessions[1]["transcription"], "primeira");
}

#[tokio::test]
async fn analyze_text_returns_structured_record() {
    let backend = spawn_backend().await;
    let user = Uuid::new_v4();
    backend.db.seed(
        "profiles",
        json!({ "id": user, "theoretical_approach": "Psicanálise" }),
    );

    let model = Arc::new(ScriptedModel::new());
    model.push_json(json!({
        "registro_descritivo": "Observa-se relato de angústia.",
        "hipoteses_clinicas": "Levanta-se hipótese de conflito.",
        "direcoes_intervencao": "Sugere-se explorar vínculos.",
        "temas_relevantes": ["angústia", "vínculos"]
    }));
    let app = routes::router(app_state(&backend, model));

    let (status, body) = request_json(
        &app,
        "POST",
        "/analyze-text",
        Some(&token_for(user)),
        Some(json!({ "text": "paciente relata angústia constante" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registro_descritivo"], "Observa-se relato de angústia.");
    assert_eq!(body["temas_relevantes"], json!(["angústia", "vínculos"]));
}

#[tokio::test]
async fn analyze_rejects_short_input() {
    let backend = spawn_backend().await;
    let user = Uuid::new_v4();
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(
        &app,
        "POST",
        "/analyze",
        Some(&token_for(user)),
        Some(json!({ "transcription": "curto" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["detail"],
        "O conteúdo da sessão deve ter pelo menos 10 caracteres."
    );
}

#[tokio::test]
async fn session_record_as_json_and_pdf() {
    let backend = spawn_backend().await;
    let owner = Uuid::new_v4();
    let patient = backend.db.seed("patients", json!({ "user_id": owner, "name": "Maria" }));
    let session = backend.db.seed(
        "sessions",
        json!({
            "patient_id": patient["id"],
            "transcription": "conteúdo da sessão",
            "insights": "hipóteses e direções"
        }),
    );
    let session_id = session["id"].as_str().unwrap();

    let model = Arc::new(ScriptedModel::new());
    model.push_json(json!({
        "finalidade": "Declaração de comparecimento",
        "informacoes_atendimento": "Atendimentos semanais desde março."
    }));
    model.push_json(json!({
        "registro_descritivo": "Observa-se...",
        "hipoteses_clinicas": "Levanta-se...",
        "direcoes_intervencao": "Sugere-se..."
    }));
    let app = routes::router(app_state(&backend, model));
    let token = token_for(owner);

    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/session/{}/record?format=json&document_type=declaracao", session_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["finalidade"], "Declaração de comparecimento");

    let (status, bytes) = request(
        &app,
        "GET",
        &format!("/session/{}/record", session_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn patient_report_aggregates_sessions() {
    let backend = spawn_backend().await;
    let owner = Uuid::new_v4();
    let patient = backend.db.seed("patients", json!({ "user_id": owner, "name": "Maria" }));
    let patient_id = patient["id"].as_str().unwrap();
    backend.db.seed(
        "sessions",
        json!({ "patient_id": patient_id, "transcription": "relato de ansiedade e medo" }),
    );
    backend.db.seed(
        "sessions",
        json!({ "patient_id": patient_id, "transcription": "consegui melhorar, estou feliz" }),
    );
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(
        &app,
        "GET",
        &format!("/api/patients/{}/reports", patient_id),
        Some(&token_for(owner)),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions_count"], 2);
    assert_eq!(body["patient"]["name"], "Maria");
    assert!(body["analysis"]["sentiment_trends"]["average_score"].is_number());
    assert!(body["analysis"]["topics"].as_array().unwrap().len() >= 2);

    let (status, bytes) = request(
        &app,
        "GET",
        &format!("/api/patients/{}/reports?report_type=pdf", patient_id),
        Some(&token_for(owner)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn profile_roundtrip() {
    let backend = spawn_backend().await;
    let user = Uuid::new_v4();
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));
    let token = token_for(user);

    let (status, _) = request_json(&app, "GET", "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    backend.db.seed("profiles", json!({ "id": user, "name": "Dra. Ana" }));

    let (status, body) = request_json(
        &app,
        "PUT",
        "/api/profile",
        Some(&token),
        Some(json!({ "theoretical_approach": "Fenomenologia", "crp": "04/12345" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["theoretical_approach"], "Fenomenologia");

    let (status, body) = request_json(&app, "GET", "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Dra. Ana");
    assert_eq!(body["crp"], "04/12345");
}

#[tokio::test]
async fn validate_crp_rejects_bad_format() {
    let backend = spawn_backend().await;
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/validate-crp",
        None,
        Some(json!({ "crp": "apenas texto" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Formato de CRP inválido"));
}

#[tokio::test]
async fn validate_crp_blocks_duplicates_without_external_call() {
    let backend = spawn_backend().await;
    backend
        .db
        .seed("profiles", json!({ "id": Uuid::new_v4(), "crp": "04/44606" }));
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/validate-crp",
        None,
        Some(json!({ "crp": "04/44606" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["exists_in_theramind"], true);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("já está vinculado"));
}

#[tokio::test]
async fn validate_crp_looks_up_registry() {
    let backend = spawn_backend().await;
    let app = routes::router(app_state(&backend, Arc::new(ScriptedModel::new())));

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/validate-crp",
        None,
        Some(json!({ "crp": "04/44606" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["exists_in_theramind"], false);
    assert_eq!(body["professional_name"], "ISA LETICIA MELO");

    let (status, body) = request_json(
        &app,
        "POST",
        "/api/validate-crp",
        None,
        Some(json!({ "crp": "04/99999" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "Profissional não encontrado no CFP");
}
