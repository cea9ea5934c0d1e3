//! Employee records and the hire/resign/transfer events that move occupied headcount.

pub mod repository;
pub mod service;

pub use repository::{EmployeeFilter, EmployeeRepository, TurnoverLog};
pub use service::EmployeeDirectory;
