//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, headers, raw bytes)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Chart analysis endpoint
pub mod analysis;
/// Admin usage report
pub mod credentials;
pub mod health;
/// Payment provider notifications
pub mod payments;
