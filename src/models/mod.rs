//! Data models.
//!
//! This module contains the credential, usage, analysis and payment types.

/// Analysis API credential model
pub mod credential;
/// Usage counter models
pub mod usage;
/// Chart analysis request and trade plan
pub mod analysis;
/// Payment notification models
pub mod payment;
