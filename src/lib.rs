//! JetBridge - legacy Access-SQL to PostgreSQL query conversion
//!
//! This crate converts saved-query definitions exported from a legacy
//! Access-style database into PostgreSQL DDL through:
//! - Syntax translation (row limits, literals, operators)
//! - Built-in function rewriting against a static registry
//! - Live-reference resolution into session-state joins
//! - Schema qualification and parameter mapping
//! - Object-shape routing (view / procedure / skipped)

pub mod utils;

pub mod catalog;
pub mod config;
pub mod model;
pub mod postgres_query_generator;
