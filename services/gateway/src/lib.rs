//! Portico developer gateway service.
//!
//! # Purpose
//! Exposes the HTTP surface, authentication glue, configuration, and
//! observability bootstrap for the gateway binary. Everything is public so
//! the integration tests can assemble the router the same way `main` does.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod observability;
