//! Manpower request lifecycle: creation, approval decisions, and reservation close-out.

pub mod repository;
pub mod service;

pub use repository::{RequestFilter, RequestRepository};
pub use service::{Decision, LifecycleSettings, RequestLifecycleManager};
