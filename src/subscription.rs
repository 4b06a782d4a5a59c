//! Plan gating.
//!
//! Billing is not wired up yet, so every account resolves to the premium
//! plan and all checks pass. The plan table and call sites are kept so the
//! gates can be turned on without touching the handlers.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    Plus,
    Premium,
}

impl Plan {
    pub fn daily_charts_limit(&self) -> u32 {
        match self {
            Plan::Free => 3,
            Plan::Plus => 10,
            // practically unlimited
            Plan::Premium => 1000,
        }
    }

    pub fn allows(&self, feature: &str) -> bool {
        match self {
            Plan::Free => matches!(feature, "ai_analysis" | "transcription" | "audio_analysis"),
            Plan::Plus => matches!(feature, "ai_analysis" | "scheduling"),
            Plan::Premium => matches!(feature, "ai_analysis" | "scheduling" | "copilot"),
        }
    }
}

/// Current plan for a user. Test mode: everyone is premium.
pub fn user_plan(_user_id: Uuid) -> Plan {
    Plan::Premium
}

/// Feature gate; permissive until billing ships
pub fn check_feature(user_id: Uuid, feature: &str) -> bool {
    user_plan(user_id).allows(feature)
}

/// Daily usage gate; permissive until billing ships
pub fn check_charts_usage(_user_id: Uuid) -> bool {
    true
}
