//! # Sentinyl Core
//!
//! Core library for the Sentinyl digital-risk-protection platform.
//!
//! ## Overview
//!
//! This crate carries everything the binaries share:
//!
//! - **Adapters**: the PostgreSQL store ([`db`]) and the Redis job queue
//!   ([`queue`])
//! - **Detectors**: the typosquat candidate generator ([`fuzzer`]), the
//!   DNS resolution stage ([`resolve`]), and the code-search leak hunter
//!   ([`leaks`])
//! - **Enrichment**: risk scoring, attack-framework mapping, graph
//!   ingestion ([`enrich`]) and multi-channel fan-out ([`notify`])
//! - **Protocols**: the dead-man's-switch evaluation ([`guard`]) and the
//!   knock sealed-box codec and validator ([`knock`])
//! - **Cross-cutting**: auth/tiers/quota ([`auth`]), env configuration
//!   ([`config`]), injected time ([`clock`]), and the error type
//!   ([`error`])

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod fuzzer;
pub mod guard;
pub mod knock;
pub mod leaks;
pub mod notify;
pub mod queue;
pub mod resolve;

pub use error::{Result, SentinylError};
