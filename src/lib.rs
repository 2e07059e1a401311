//! Portfolio Backend Library
//!
//! Exposes the auth, content and storage layers for the server binary and
//! the integration tests.

pub mod api;
pub mod auth;
pub mod clock;
pub mod content;
pub mod models;
pub mod store;
