//! HTTP surface of the Tabular AutoML service
//!
//! Exposes training, prediction and model management over JSON, plus
//! liveness, readiness and Prometheus endpoints.

pub mod api;
pub mod config;
