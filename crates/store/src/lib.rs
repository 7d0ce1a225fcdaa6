//! Persistence layer for the library backend.
//!
//! Every multi-step mutation runs inside a [`StoreTransaction`] obtained from
//! [`LibraryStore::begin`]. A transaction is applied only by
//! [`StoreTransaction::commit`]; dropping it rolls back all of its writes.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{
    BookId, LoanId, LoanStatus, MemberId, PaymentAttemptId, PaymentStatus, ReceiptId,
    ReceiptStatus,
};
pub use error::{Result, StoreError};
pub use memory::InMemoryLibraryStore;
pub use postgres::PostgresLibraryStore;
pub use records::{
    Book, Loan, Member, MemberRole, NewBook, NewLoan, NewPaymentAttempt, NewReceipt,
    PaymentAttempt, Receipt, Settlement,
};
pub use store::{LibraryStore, StoreTransaction};
