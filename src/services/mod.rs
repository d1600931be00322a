//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers:
//! credential rotation, usage accounting, the analysis client and payment
//! verification.

pub mod analysis_service;
pub mod calendar;
pub mod clock;
pub mod counter_store;
pub mod gemini;
pub mod payment_service;
pub mod rotation;
pub mod scheduler;
pub mod usage_tracker;

#[cfg(test)]
pub mod test_support;
