//! Shared identifiers and lifecycle states used across the library backend.

pub mod status;
pub mod types;

pub use status::{LoanStatus, PaymentStatus, ReceiptStatus};
pub use types::{BookId, LoanId, MemberId, PaymentAttemptId, ReceiptId};
