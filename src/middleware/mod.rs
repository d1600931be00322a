//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can authenticate requests or short-circuit them (reject unauthorized).

/// Admin token authentication middleware
pub mod auth;
