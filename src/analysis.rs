//! Deterministic session analytics: keyword sentiment, topic extraction and
//! visit-frequency statistics. These run entirely offline over stored session
//! rows; the model-backed analysis lives in [`crate::documents`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::SessionRecord;

/// Topic labels and the keyword stems that signal them, in Portuguese.
/// A stem matches by substring so inflected forms count ("ansioso",
/// "ansiosa", "ansiedade" all hit "ansio").
pub const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "ansiedade",
        &["ansio", "preocup", "nervos", "medo", "pânico", "angústia", "tensão", "inquietação"],
    ),
    (
        "depressão",
        &["triste", "vazio", "desesperanç", "desânimo", "cansaço", "culpa", "inútil", "morte", "suicídio"],
    ),
    (
        "estresse",
        &["estress", "sobrecarr", "pressão", "sobrecarregado", "exausto", "esgotado"],
    ),
    (
        "relacionamentos",
        &["namorado", "namorada", "esposo", "esposa", "marido", "mulher", "pai", "mãe", "filho", "filha", "amigo", "amiga", "colega", "chefe"],
    ),
    (
        "trabalho",
        &["trabalho", "emprego", "carreira", "profissional", "chefe", "colegas", "demissão", "promoção"],
    ),
    (
        "autoestima",
        &["feio", "feia", "inseguro", "insegurança", "confiança", "autoestima", "auto-imagem", "aparência"],
    ),
    (
        "conquista",
        &["consegui", "venci", "superei", "melhorei", "evoluí", "entendi", "descobri", "feliz", "alegre", "paz", "tranquilo"],
    ),
];

fn keywords_for(topic: &str) -> &'static [&'static str] {
    TOPIC_KEYWORDS
        .iter()
        .find(|(name, _)| *name == topic)
        .map(|(_, words)| *words)
        .unwrap_or(&[])
}

/// Keyword-balance sentiment score in [-1.0, 1.0]. Fallback for sessions
/// whose stored analysis carries no model-produced score.
pub fn estimate_sentiment(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let text = text.to_lowercase();

    let neg_count = ["ansiedade", "depressão", "estresse"]
        .iter()
        .flat_map(|topic| keywords_for(topic))
        .filter(|word| text.contains(**word))
        .count() as f64;
    let pos_count = keywords_for("conquista")
        .iter()
        .filter(|word| text.contains(**word))
        .count() as f64;

    let total = neg_count + pos_count;
    if total == 0.0 {
        return 0.0;
    }

    (pos_count - neg_count) / total.max(1.0)
}

fn session_score(session: &SessionRecord) -> f64 {
    if let Some(analysis) = &session.analysis {
        if analysis.is_object() {
            return analysis
                .get("sentiment")
                .and_then(|s| s.get("score"))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
        }
    }
    let text = session
        .transcription
        .as_deref()
        .or(session.summary.as_deref())
        .unwrap_or("");
    estimate_sentiment(text)
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolutionPoint {
    pub date: String,
    pub avg_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentTrends {
    pub average_score: f64,
    pub trend: String,
    pub total_sessions_analyzed: usize,
    pub evolution: Vec<EvolutionPoint>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Per-session sentiment aggregated into an overall average, a trend label
/// (melhorando / piorando / estável with a 0.1 dead band) and per-day
/// evolution points for charting.
pub fn calculate_sentiment_trends(sessions: &[SessionRecord]) -> Option<SentimentTrends> {
    if sessions.is_empty() {
        return None;
    }

    let mut scores = Vec::with_capacity(sessions.len());
    let mut by_date: Vec<(String, Vec<f64>)> = Vec::new();

    for session in sessions {
        let score = session_score(session);
        let date = session.created_at.format("%Y-%m-%d").to_string();
        scores.push(score);
        match by_date.iter_mut().find(|(d, _)| *d == date) {
            Some((_, bucket)) => bucket.push(score),
            None => by_date.push((date, vec![score])),
        }
    }

    let avg = scores.iter().sum::<f64>() / scores.len() as f64;

    let mut trend = "estável";
    if scores.len() > 1 {
        let (first, second) = scores.split_at(scores.len() / 2);
        let avg_first = first.iter().sum::<f64>() / first.len() as f64;
        let avg_second = second.iter().sum::<f64>() / second.len() as f64;
        if avg_second > avg_first + 0.1 {
            trend = "melhorando";
        } else if avg_second < avg_first - 0.1 {
            trend = "piorando";
        }
    }

    by_date.sort_by(|(a, _), (b, _)| a.cmp(b));
    let evolution = by_date
        .into_iter()
        .map(|(date, bucket)| EvolutionPoint {
            avg_score: bucket.iter().sum::<f64>() / bucket.len() as f64,
            date,
        })
        .collect();

    Some(SentimentTrends {
        average_score: round2(avg),
        trend: trend.to_string(),
        total_sessions_analyzed: scores.len(),
        evolution,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

/// Topics present in session transcriptions, counted at most once per
/// session, top five by frequency. Ties keep first-discovered order.
pub fn extract_common_topics(sessions: &[SessionRecord]) -> Vec<TopicCount> {
    let mut counts: Vec<TopicCount> = Vec::new();

    for session in sessions {
        let Some(transcription) = &session.transcription else {
            continue;
        };
        let text = transcription.to_lowercase();

        for (topic, keywords) in TOPIC_KEYWORDS {
            if keywords.iter().any(|word| text.contains(word)) {
                match counts.iter_mut().find(|c| c.topic == *topic) {
                    Some(entry) => entry.count += 1,
                    None => counts.push(TopicCount {
                        topic: topic.to_string(),
                        count: 1,
                    }),
                }
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(5);
    counts
}

#[derive(Debug, Clone, Serialize)]
pub struct MostCommonDay {
    pub day: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionFrequency {
    pub total_sessions: usize,
    pub first_session: String,
    pub last_session: String,
    pub avg_days_between_sessions: f64,
    pub sessions_per_week: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_common_day: Option<MostCommonDay>,
    pub sessions_by_weekday: HashMap<String, usize>,
}

/// Cadence statistics over session timestamps: average gap in whole days,
/// implied sessions per week and the weekday distribution.
pub fn calculate_session_frequency(sessions: &[SessionRecord]) -> Option<SessionFrequency> {
    if sessions.is_empty() {
        return None;
    }

    let mut dates: Vec<DateTime<Utc>> = sessions.iter().map(|s| s.created_at).collect();
    dates.sort();

    let intervals: Vec<i64> = dates
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_days())
        .collect();
    let avg_interval = if intervals.is_empty() {
        0.0
    } else {
        intervals.iter().sum::<i64>() as f64 / intervals.len() as f64
    };

    // Weekday order of first appearance decides ties below
    let mut weekday_order: Vec<String> = Vec::new();
    let mut weekday_counts: HashMap<String, usize> = HashMap::new();
    for date in &dates {
        let weekday = date.format("%A").to_string();
        if !weekday_counts.contains_key(&weekday) {
            weekday_order.push(weekday.clone());
        }
        *weekday_counts.entry(weekday).or_insert(0) += 1;
    }

    let most_common_day = weekday_order
        .iter()
        .max_by_key(|day| weekday_counts[*day])
        .map(|day| MostCommonDay {
            day: day.clone(),
            count: weekday_counts[day],
        });

    Some(SessionFrequency {
        total_sessions: dates.len(),
        first_session: dates[0].to_rfc3339(),
        last_session: dates[dates.len() - 1].to_rfc3339(),
        avg_days_between_sessions: round1(avg_interval),
        sessions_per_week: if avg_interval > 0.0 {
            round1(7.0 / avg_interval)
        } else {
            0.0
        },
        most_common_day,
        sessions_by_weekday: weekday_counts,
    })
}
