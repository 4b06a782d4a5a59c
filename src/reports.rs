//! Patient evolution reports.
//!
//! Assembles the stored sessions of one patient, optionally bounded by a
//! date range, into the aggregate report served as JSON or rendered to PDF.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::{
    calculate_sentiment_trends, calculate_session_frequency, extract_common_topics,
};
use crate::models::{PatientRecord, SessionRecord};

#[derive(Debug, Clone, Serialize)]
pub struct ReportPeriod {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_trends: Option<crate::analysis::SentimentTrends>,
    pub topics: Vec<crate::analysis::TopicCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_frequency: Option<crate::analysis::SessionFrequency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientReport {
    pub patient: PatientRecord,
    pub sessions_count: usize,
    pub period: ReportPeriod,
    pub analysis: ReportAnalysis,
}

/// Build the evolution report for a patient from their stored sessions
pub fn build_patient_report(
    patient: PatientRecord,
    sessions: &[SessionRecord],
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> PatientReport {
    PatientReport {
        sessions_count: sessions.len(),
        period: ReportPeriod {
            start: start_date.map(|d| d.to_rfc3339()),
            end: end_date.map(|d| d.to_rfc3339()),
        },
        analysis: ReportAnalysis {
            sentiment_trends: calculate_sentiment_trends(sessions),
            topics: extract_common_topics(sessions),
            session_frequency: calculate_session_frequency(sessions),
        },
        patient,
    }
}
