//! Typed domain records.
//!
//! Rows coming back from PostgREST are decoded into these structs at the
//! boundary; unknown fields are ignored and optional columns default to
//! `None` so a partial `select` never fails to decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Patient owned by a single practitioner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Minimal projection used for ownership checks
#[derive(Debug, Clone, Deserialize)]
pub struct PatientOwner {
    pub id: Uuid,
    pub user_id: Uuid,
}

/// Therapy-session entry (transcript, derived clinical text, themes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub transcription: Option<String>,
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
    /// Model-derived analysis payload; `sentiment.score` is preferred over
    /// the keyword heuristic when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// New session row to insert
#[derive(Debug, Clone, Serialize)]
pub struct NewSession {
    pub patient_id: Uuid,
    pub audio_url: Option<String>,
    pub transcription: String,
    pub summary: String,
    pub insights: String,
    pub themes: Vec<String>,
    pub registro_descritivo: String,
    pub hipoteses_clinicas: String,
    pub direcoes_intervencao: String,
}

/// New appointment row; date-time carries an explicit UTC-3 offset
#[derive(Debug, Clone, Serialize)]
pub struct NewAppointment {
    pub user_id: Uuid,
    pub patient_id: String,
    pub appointment_date: String,
    pub duration_minutes: i64,
    pub price: f64,
    pub status: String,
    pub payment_status: String,
}

/// Copilot conversation thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Persisted chat message, append-only and ordered by creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Practitioner profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub crp: Option<String>,
    #[serde(default)]
    pub theoretical_approach: Option<String>,
    #[serde(default)]
    pub recovery_email: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    /// Therapeutic approach, defaulting like the profile editor does
    pub fn approach(&self) -> &str {
        self.theoretical_approach.as_deref().unwrap_or("Integrativa")
    }
}

/// Row shape returned by the patient-search tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientHit {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}
