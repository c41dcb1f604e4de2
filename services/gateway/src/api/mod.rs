//! Gateway HTTP API module.
//!
//! # Purpose and responsibility
//! Exposes the route handler modules, the wire types, and the standardized
//! error shapes of the `/v0/api` surface.
//!
//! # Key invariants and assumptions
//! - AAD verification and request validation happen before any backend call.
//! - Error shapes are standardized via `api::error`.
pub mod error;
pub mod openapi;
pub mod service;
pub mod system;
pub mod types;
