//! OrderFlow REST server: axum router, JWT middleware, local blob storage
//! and the Gemini document extractor.

pub mod blob;
pub mod config;
pub mod error;
pub mod gemini;
pub mod handlers;
pub mod middleware;
pub mod router;
