//! TheraMind API: web backend for a clinical-practice management tool
//! for psychologists.
//!
//! Every endpoint is a thin handler: authenticate the request, perform a
//! couple of reads/writes against Supabase (PostgREST), optionally call the
//! Gemini API, and return JSON or a generated PDF. The one stateful piece is
//! the copilot tool-loop in [`copilot`], which drives the model through a
//! bounded number of function-call round-trips.

pub mod analysis;
pub mod auth;
pub mod cfp;
pub mod config;
pub mod copilot;
pub mod documents;
pub mod error;
pub mod llm;
pub mod models;
pub mod pdf;
pub mod reports;
pub mod routes;
pub mod subscription;
pub mod supabase;
pub mod tools;
