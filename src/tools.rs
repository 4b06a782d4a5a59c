//! Copilot tools: patient search, patient registration, appointment
//! scheduling and quick session notes.
//!
//! Tool execution never fails the request. Every outcome, success or error,
//! becomes a Portuguese result string fed back to the model, which decides
//! how to relay it to the practitioner.

use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::auth::AuthUser;
use crate::llm::FunctionDeclaration;
use crate::models::{NewAppointment, PatientHit};
use crate::supabase::SupabaseClient;

const DEFAULT_DURATION_MINUTES: i64 = 50;
const DEFAULT_PRICE: f64 = 150.0;

/// Brasília time (UTC-3); scheduling inputs are interpreted in this offset
pub fn brasilia_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).expect("valid offset")
}

/// A tool invocation the model requested, with arguments already validated
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    SearchPatients {
        query: String,
    },
    CreatePatient {
        name: String,
        email: String,
        phone: String,
    },
    CreateAppointment {
        patient_id: String,
        date: String,
        time: String,
        duration_minutes: i64,
        price: f64,
    },
    CreateSessionNote {
        patient_id: String,
        note: String,
    },
}

/// Why a model function call could not be mapped onto a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolParseError {
    UnknownTool,
    MissingArgument(&'static str),
}

impl ToolParseError {
    /// In-band message handed back to the model as the tool result
    pub fn to_result_string(&self, tool_name: &str) -> String {
        match self {
            Self::UnknownTool => format!("Erro: Ferramenta {} desconhecida.", tool_name),
            Self::MissingArgument(key) => format!(
                "Erro: Argumento obrigatório '{}' ausente para a ferramenta {}.",
                key, tool_name
            ),
        }
    }
}

fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn required(args: &Value, key: &'static str) -> Result<String, ToolParseError> {
    arg_str(args, key).ok_or(ToolParseError::MissingArgument(key))
}

impl ToolInvocation {
    /// Map a model function call onto a known tool
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolParseError> {
        match name {
            "search_patients" => Ok(Self::SearchPatients {
                query: required(args, "query")?,
            }),
            "create_patient" => Ok(Self::CreatePatient {
                name: required(args, "name")?,
                email: required(args, "email")?,
                phone: required(args, "phone")?,
            }),
            "create_appointment" => Ok(Self::CreateAppointment {
                patient_id: required(args, "patient_id")?,
                // models alternate between the two spellings
                date: arg_str(args, "date_str")
                    .or_else(|| arg_str(args, "date"))
                    .ok_or(ToolParseError::MissingArgument("date_str"))?,
                time: arg_str(args, "time_str")
                    .or_else(|| arg_str(args, "time"))
                    .ok_or(ToolParseError::MissingArgument("time_str"))?,
                duration_minutes: args
                    .get("duration_minutes")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(DEFAULT_DURATION_MINUTES),
                price: args
                    .get("price")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(DEFAULT_PRICE),
            }),
            "create_session_note" => Ok(Self::CreateSessionNote {
                patient_id: required(args, "patient_id")?,
                note: required(args, "note")?,
            }),
            _ => Err(ToolParseError::UnknownTool),
        }
    }

    /// Run the tool for the authenticated practitioner. The result string is
    /// what the model sees; failures are reported in-band.
    pub async fn execute(&self, db: &SupabaseClient, actor: &AuthUser) -> String {
        match self {
            Self::SearchPatients { query } => {
                info!("Tool search_patients: query={}", query);
                match search_patients(db, actor, query).await {
                    Ok(result) => result,
                    Err(e) => format!("Erro ao buscar pacientes: {}", e),
                }
            }
            Self::CreatePatient { name, email, phone } => {
                info!("Tool create_patient: name={}, email={}", name, email);
                match create_patient(db, actor, name, email, phone).await {
                    Ok(result) => result,
                    Err(e) => format!("Erro ao cadastrar paciente: {}", e),
                }
            }
            Self::CreateAppointment {
                patient_id,
                date,
                time,
                duration_minutes,
                price,
            } => {
                info!(
                    "Tool create_appointment: patient_id={}, date={}, time={}",
                    patient_id, date, time
                );
                let Ok(appointment_date) = combine_date_time(date, time) else {
                    return "Erro: Formato de data (YYYY-MM-DD) ou hora (HH:MM) inválido."
                        .to_string();
                };
                let row = NewAppointment {
                    user_id: actor.user_id,
                    patient_id: patient_id.clone(),
                    appointment_date,
                    duration_minutes: *duration_minutes,
                    price: *price,
                    status: "scheduled".to_string(),
                    payment_status: "pending".to_string(),
                };
                match db.insert::<_, Value>("appointments", &row).await {
                    Ok(_) => format!("Agendamento criado com sucesso para {} às {}.", date, time),
                    Err(e) => {
                        error!("Tool create_appointment ERROR: {}", e);
                        format!("Erro ao criar agendamento: {}", e)
                    }
                }
            }
            Self::CreateSessionNote { patient_id, note } => {
                match create_session_note(db, patient_id, note).await {
                    Ok(result) => result,
                    Err(e) => format!("Erro ao salvar registro: {}", e),
                }
            }
        }
    }
}

async fn search_patients(
    db: &SupabaseClient,
    actor: &AuthUser,
    query: &str,
) -> Result<String, crate::supabase::SupabaseError> {
    let patients: Vec<PatientHit> = db
        .from("patients")
        .select("id, name, email")
        .eq("user_id", &actor.user_id.to_string())
        .ilike("name", &format!("*{}*", query))
        .fetch()
        .await?;

    if patients.is_empty() {
        return Ok("Nenhum paciente encontrado com esse nome.".to_string());
    }
    Ok(serde_json::to_string(&patients)?)
}

async fn create_patient(
    db: &SupabaseClient,
    actor: &AuthUser,
    name: &str,
    email: &str,
    phone: &str,
) -> Result<String, crate::supabase::SupabaseError> {
    let existing: Vec<Value> = db
        .from("patients")
        .select("id")
        .eq("user_id", &actor.user_id.to_string())
        .eq("email", email)
        .fetch()
        .await?;
    if !existing.is_empty() {
        return Ok(format!("Erro: Já existe um paciente com o email {}.", email));
    }

    let row = json!({
        "user_id": actor.user_id,
        "name": name,
        "email": email,
        "phone": phone,
    });
    let created: Value = db.insert("patients", &row).await?;
    let id = created.get("id").and_then(|v| v.as_str()).unwrap_or("?");
    Ok(format!("Paciente {} cadastrado com sucesso! ID: {}", name, id))
}

async fn create_session_note(
    db: &SupabaseClient,
    patient_id: &str,
    note: &str,
) -> Result<String, crate::supabase::SupabaseError> {
    // Quick notes land in the sessions table, tagged so they are easy to
    // tell apart from full session records
    let row = json!({
        "patient_id": patient_id,
        "transcription": note,
        "summary": "Registro via Chat (Queixa Principal/Nota Rápida)",
        "insights": "Registro manual via chat.",
        "themes": ["Chat", "Queixa Principal"],
    });
    db.insert::<_, Value>("sessions", &row).await?;
    Ok("Registro (Queixa Principal) salvo com sucesso nas sessões do paciente.".to_string())
}

/// Combine a date and a wall-clock time into an RFC 3339 timestamp with the
/// Brasília offset
pub fn combine_date_time(date: &str, time: &str) -> Result<String, ()> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| ())?;
    let time = NaiveTime::parse_from_str(time, "%H:%M").map_err(|_| ())?;
    let local = brasilia_offset()
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or(())?;
    Ok(local.to_rfc3339())
}

/// Gemini declarations for the four copilot tools
pub fn declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: "search_patients".to_string(),
            description: "Busca pacientes pelo nome para obter o patient_id.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Nome ou parte do nome do paciente" }
                },
                "required": ["query"]
            }),
        },
        FunctionDeclaration {
            name: "create_patient".to_string(),
            description: "Cadastra um novo paciente no sistema.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Nome completo do paciente" },
                    "email": { "type": "string", "description": "Email do paciente" },
                    "phone": { "type": "string", "description": "Telefone do paciente (ex: 11999999999)" }
                },
                "required": ["name", "email", "phone"]
            }),
        },
        FunctionDeclaration {
            name: "create_appointment".to_string(),
            description: "Agenda uma consulta para um paciente existente. Requer patient_id (use search_patients se não souber).".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "patient_id": { "type": "string", "description": "UUID do paciente" },
                    "date": { "type": "string", "description": "Data no formato YYYY-MM-DD" },
                    "time": { "type": "string", "description": "Hora no formato HH:MM" },
                    "duration_minutes": { "type": "integer", "description": "Duração em minutos (default 50)" },
                    "price": { "type": "number", "description": "Valor da consulta (default 150.0)" }
                },
                "required": ["patient_id", "date", "time"]
            }),
        },
        FunctionDeclaration {
            name: "create_session_note".to_string(),
            description: "Registra uma queixa principal ou nota rápida para o paciente. Requer patient_id.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "patient_id": { "type": "string", "description": "UUID do paciente" },
                    "note": { "type": "string", "description": "Texto da queixa ou nota" }
                },
                "required": ["patient_id", "note"]
            }),
        },
    ]
}
