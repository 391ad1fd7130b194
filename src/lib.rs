//! Gatehouse - HTTP Admission Control Service
//!
//! This crate implements per-request admission control for web platforms:
//! fixed-window rate limiting backed by a shared counter store, and a
//! shared-secret guard for scheduler-invoked endpoints. It runs as a
//! standalone decision service and exposes the same checks as embeddable
//! Axum middleware.

pub mod config;
pub mod cronauth;
pub mod error;
pub mod http;
pub mod ratelimit;
