use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Book, BookId, Loan, LoanId, Member, MemberId, NewBook, NewLoan, NewPaymentAttempt, NewReceipt,
    PaymentAttempt, PaymentAttemptId, Receipt, ReceiptId, Result, Settlement,
};

/// Core trait for library store implementations.
///
/// Plain reads and single-row catalog writes are available directly on the
/// store. Anything that touches stock, loans, receipts or payment attempts
/// together goes through [`LibraryStore::begin`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Opens a request-scoped transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Registers a member. Fails with `Duplicate` if the id is taken.
    async fn insert_member(&self, member: Member) -> Result<Member>;

    async fn get_member(&self, id: &MemberId) -> Result<Option<Member>>;

    /// Adds a title to the catalog. Fails with `Duplicate` on a known ISBN or title.
    async fn insert_book(&self, book: NewBook) -> Result<Book>;

    async fn get_book(&self, id: BookId) -> Result<Option<Book>>;

    /// Lists the catalog ordered by id.
    async fn list_books(&self) -> Result<Vec<Book>>;

    /// Removes a title. Returns false if it did not exist.
    async fn delete_book(&self, id: BookId) -> Result<bool>;

    async fn get_loan(&self, id: LoanId) -> Result<Option<Loan>>;

    /// Lists loans ordered by id, optionally restricted to one member.
    async fn list_loans(&self, member_id: Option<&MemberId>) -> Result<Vec<Loan>>;

    async fn get_receipt(&self, id: ReceiptId) -> Result<Option<Receipt>>;

    /// Lists receipts ordered by id, optionally restricted to one member.
    async fn list_receipts(&self, member_id: Option<&MemberId>) -> Result<Vec<Receipt>>;

    async fn get_payment_attempt(&self, checkout_request_id: &str)
    -> Result<Option<PaymentAttempt>>;

    /// Lists every attempt made against a receipt, oldest first.
    async fn list_payment_attempts(&self, receipt_id: ReceiptId) -> Result<Vec<PaymentAttempt>>;
}

/// A unit of work against the store.
///
/// Reads named `lock_*` take a row lock that is held until the transaction
/// ends, so the caller can check a status and then update it without racing
/// concurrent requests.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get_member(&mut self, id: &MemberId) -> Result<Option<Member>>;

    async fn get_book(&mut self, id: BookId) -> Result<Option<Book>>;

    /// Removes `by` copies from the shelf if at least that many remain.
    ///
    /// Returns the remaining stock, `NotFound` for an unknown book, or
    /// `InsufficientStock` leaving the stock untouched.
    async fn decrement_stock(&mut self, id: BookId, by: u32) -> Result<i64>;

    /// Puts `by` copies back on the shelf and returns the new stock.
    async fn increment_stock(&mut self, id: BookId, by: u32) -> Result<i64>;

    async fn insert_loan(&mut self, loan: NewLoan) -> Result<Loan>;

    async fn lock_loan(&mut self, id: LoanId) -> Result<Option<Loan>>;

    async fn mark_loan_returned(&mut self, id: LoanId, returned_on: DateTime<Utc>) -> Result<Loan>;

    async fn insert_receipt(&mut self, receipt: NewReceipt) -> Result<Receipt>;

    async fn lock_receipt(&mut self, id: ReceiptId) -> Result<Option<Receipt>>;

    async fn mark_receipt_paid(&mut self, id: ReceiptId, payment_reference: &str)
    -> Result<Receipt>;

    /// Records a push request. Fails with `Duplicate` on a reused checkout reference.
    async fn insert_payment_attempt(&mut self, attempt: NewPaymentAttempt)
    -> Result<PaymentAttempt>;

    async fn lock_payment_attempt(
        &mut self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentAttempt>>;

    async fn settle_payment_attempt(
        &mut self,
        id: PaymentAttemptId,
        settlement: Settlement,
    ) -> Result<PaymentAttempt>;

    /// Applies every write made through this transaction.
    async fn commit(self: Box<Self>) -> Result<()>;
}
