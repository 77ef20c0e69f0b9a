//! Lowdeck runtime: query execution over resolved options.
//!
//! This crate ties the resolution engine to the backend services:
//!
//! ```text
//! ┌──────────────┐
//! │    Query     │
//! │   Executor   │
//! └──────┬───────┘
//!        │ materialize + interpolate
//!   ┌────┴─────┐
//!   │ Services │ (restapi, ...)
//!   └──────────┘
//! ```
//!
//! On an unauthorized failure the executor runs the refresh-token flow and
//! retries the query exactly once.

pub mod datasource;
pub mod executor;

pub use datasource::{DataSourceStore, MemoryDataSourceStore};
pub use executor::QueryExecutor;
