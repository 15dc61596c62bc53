//! TTB Label Verification System
//!
//! This library provides the core functionality for the ttb-label-verifier
//! system: a durable SQLite-backed job queue, a single-consumer worker that
//! drives label verification through a vision-model OCR backend, and the
//! request-facing queue manager used by the HTTP API.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod worker;
