//! Domain layer for the library backend.
//!
//! This crate provides the services that sit on top of the store:
//! - `LendingService` for the borrow/return state machine
//! - `CatalogService` for member registration and catalog maintenance

pub mod catalog;
pub mod error;
pub mod lending;

pub use catalog::{BookSummary, CatalogService, summarize_books};
pub use error::{DomainError, Result};
pub use lending::{LOAN_PERIOD_DAYS, LendingService, LoanDetails};
