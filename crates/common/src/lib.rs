//! Common utilities, types, and configurations shared across Lowdeck crates.
//!
//! This crate contains the base building blocks for the Lowdeck system, including:
//! - **Configuration**: Strongly typed application configuration (`config`).
//! - **Models**: Shared domain types for queries, data sources, and secrets (`models`).
//! - **Telemetry**: Observability setup (`telemetry`).
pub mod config;
pub mod models;
pub mod telemetry;
