//! Environment configuration.
//!
//! All settings come from environment variables; the process refuses to start
//! without the Supabase and Gemini credentials so that auth can never be
//! silently bypassed at request time.

use anyhow::{Context, Result};
use std::net::SocketAddr;

/// Default bind address when `BIND_ADDR` is unset
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Supabase project URL (e.g. "https://xyz.supabase.co")
    pub supabase_url: String,
    /// Service-role key used for PostgREST access
    pub supabase_service_role_key: String,
    /// HS256 secret used to verify Supabase-issued JWTs
    pub supabase_jwt_secret: String,
    /// Google API key for Gemini
    pub google_api_key: String,
    /// Allowed CORS origins; empty or "*" means any origin
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("Invalid BIND_ADDR")?;

        let supabase_url =
            std::env::var("SUPABASE_URL").context("SUPABASE_URL is not configured")?;
        let supabase_service_role_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .context("SUPABASE_SERVICE_ROLE_KEY is not configured")?;
        let supabase_jwt_secret = std::env::var("SUPABASE_JWT_SECRET")
            .context("SUPABASE_JWT_SECRET is not configured")?;
        let google_api_key =
            std::env::var("GOOGLE_API_KEY").context("GOOGLE_API_KEY is not configured")?;

        let cors_origins = std::env::var("BACKEND_CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_addr,
            supabase_url,
            supabase_service_role_key,
            supabase_jwt_secret,
            google_api_key,
            cors_origins,
        })
    }

    /// Whether CORS should fall back to allowing any origin
    pub fn cors_allow_any(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}
