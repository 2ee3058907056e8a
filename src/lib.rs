//! storemon library - store uptime/downtime estimation
//!
//! This module exports internal components for integration testing.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod ingest;
pub mod jobs;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod source;
