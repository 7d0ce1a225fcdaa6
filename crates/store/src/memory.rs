use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Book, BookId, Loan, LoanId, LoanStatus, Member, MemberId, NewBook, NewLoan,
    NewPaymentAttempt, NewReceipt, PaymentAttempt, PaymentAttemptId, PaymentStatus, Receipt,
    ReceiptId, ReceiptStatus, Result, Settlement, StoreError,
    store::{LibraryStore, StoreTransaction},
};

#[derive(Debug, Clone, Default)]
struct LibraryState {
    members: BTreeMap<MemberId, Member>,
    books: BTreeMap<BookId, Book>,
    loans: BTreeMap<LoanId, Loan>,
    receipts: BTreeMap<ReceiptId, Receipt>,
    attempts: BTreeMap<PaymentAttemptId, PaymentAttempt>,
    last_book_id: i64,
    last_loan_id: i64,
    last_receipt_id: i64,
    last_attempt_id: i64,
}

impl LibraryState {
    fn book_mut(&mut self, id: BookId) -> Result<&mut Book> {
        self.books
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("book", id))
    }

    fn decrement_stock(&mut self, id: BookId, by: u32) -> Result<i64> {
        let book = self.book_mut(id)?;
        if book.stock < i64::from(by) {
            return Err(StoreError::InsufficientStock {
                book_id: id,
                requested: by,
                available: book.stock,
            });
        }
        book.stock -= i64::from(by);
        Ok(book.stock)
    }

    fn increment_stock(&mut self, id: BookId, by: u32) -> Result<i64> {
        let book = self.book_mut(id)?;
        book.stock += i64::from(by);
        Ok(book.stock)
    }

    fn insert_loan(&mut self, new: NewLoan) -> Loan {
        self.last_loan_id += 1;
        let loan = Loan {
            id: LoanId::new(self.last_loan_id),
            book_id: new.book_id,
            member_id: new.member_id,
            borrowed_on: new.borrowed_on,
            due_on: new.due_on,
            returned_on: None,
            status: LoanStatus::Active,
        };
        self.loans.insert(loan.id, loan.clone());
        loan
    }

    fn mark_loan_returned(&mut self, id: LoanId, returned_on: DateTime<Utc>) -> Result<Loan> {
        let loan = self
            .loans
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("loan", id))?;
        loan.status = LoanStatus::Returned;
        loan.returned_on = Some(returned_on);
        Ok(loan.clone())
    }

    fn insert_receipt(&mut self, new: NewReceipt) -> Receipt {
        self.last_receipt_id += 1;
        let receipt = Receipt {
            id: ReceiptId::new(self.last_receipt_id),
            book_ids: new.book_ids,
            member_id: new.member_id,
            total_amount: new.total_amount,
            status: ReceiptStatus::Unpaid,
            payment_reference: None,
            created_at: new.created_at,
        };
        self.receipts.insert(receipt.id, receipt.clone());
        receipt
    }

    fn mark_receipt_paid(&mut self, id: ReceiptId, payment_reference: &str) -> Result<Receipt> {
        let receipt = self
            .receipts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("receipt", id))?;
        receipt.status = ReceiptStatus::Paid;
        receipt.payment_reference = Some(payment_reference.to_string());
        Ok(receipt.clone())
    }

    fn insert_payment_attempt(&mut self, new: NewPaymentAttempt) -> Result<PaymentAttempt> {
        if self.attempt_by_checkout(&new.checkout_request_id).is_some() {
            return Err(StoreError::Duplicate {
                entity: "payment attempt",
                key: new.checkout_request_id,
            });
        }
        self.last_attempt_id += 1;
        let attempt = PaymentAttempt {
            id: PaymentAttemptId::new(self.last_attempt_id),
            checkout_request_id: new.checkout_request_id,
            receipt_id: new.receipt_id,
            member_id: new.member_id,
            amount: new.amount,
            phone: new.phone,
            status: PaymentStatus::Pending,
            gateway_receipt_number: None,
            result_description: None,
            created_at: new.created_at,
        };
        self.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    fn attempt_by_checkout(&self, checkout_request_id: &str) -> Option<&PaymentAttempt> {
        self.attempts
            .values()
            .find(|a| a.checkout_request_id == checkout_request_id)
    }

    fn settle_payment_attempt(
        &mut self,
        id: PaymentAttemptId,
        settlement: Settlement,
    ) -> Result<PaymentAttempt> {
        let attempt = self
            .attempts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("payment attempt", id))?;
        attempt.status = settlement.status;
        attempt.gateway_receipt_number = settlement.gateway_receipt_number;
        attempt.result_description = settlement.result_description;
        Ok(attempt.clone())
    }
}

/// In-memory library store for testing and local development.
///
/// A transaction holds the store's mutex for its whole lifetime, so
/// transactions are fully serialized. Rollback restores a snapshot taken
/// when the transaction began.
#[derive(Clone, Default)]
pub struct InMemoryLibraryStore {
    state: Arc<Mutex<LibraryState>>,
}

impl InMemoryLibraryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of payment attempts stored.
    pub async fn payment_attempt_count(&self) -> usize {
        self.state.lock().await.attempts.len()
    }

    /// Clears all rows and resets the id sequences.
    pub async fn clear(&self) {
        *self.state.lock().await = LibraryState::default();
    }
}

#[async_trait]
impl LibraryStore for InMemoryLibraryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            snapshot: Some(snapshot),
        }))
    }

    async fn insert_member(&self, member: Member) -> Result<Member> {
        let mut state = self.state.lock().await;
        if state.members.contains_key(&member.id) {
            return Err(StoreError::Duplicate {
                entity: "member",
                key: member.id.to_string(),
            });
        }
        state.members.insert(member.id.clone(), member.clone());
        Ok(member)
    }

    async fn get_member(&self, id: &MemberId) -> Result<Option<Member>> {
        Ok(self.state.lock().await.members.get(id).cloned())
    }

    async fn insert_book(&self, new: NewBook) -> Result<Book> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .books
            .values()
            .find(|b| b.isbn == new.isbn || b.title == new.title)
        {
            return Err(StoreError::Duplicate {
                entity: "book",
                key: existing.isbn.clone(),
            });
        }
        state.last_book_id += 1;
        let book = Book {
            id: BookId::new(state.last_book_id),
            title: new.title,
            author: new.author,
            isbn: new.isbn,
            stock: new.stock,
            price: new.price,
        };
        state.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn get_book(&self, id: BookId) -> Result<Option<Book>> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        Ok(self.state.lock().await.books.values().cloned().collect())
    }

    async fn delete_book(&self, id: BookId) -> Result<bool> {
        Ok(self.state.lock().await.books.remove(&id).is_some())
    }

    async fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self.state.lock().await.loans.get(&id).cloned())
    }

    async fn list_loans(&self, member_id: Option<&MemberId>) -> Result<Vec<Loan>> {
        let state = self.state.lock().await;
        Ok(state
            .loans
            .values()
            .filter(|l| member_id.is_none_or(|m| &l.member_id == m))
            .cloned()
            .collect())
    }

    async fn get_receipt(&self, id: ReceiptId) -> Result<Option<Receipt>> {
        Ok(self.state.lock().await.receipts.get(&id).cloned())
    }

    async fn list_receipts(&self, member_id: Option<&MemberId>) -> Result<Vec<Receipt>> {
        let state = self.state.lock().await;
        Ok(state
            .receipts
            .values()
            .filter(|r| member_id.is_none_or(|m| &r.member_id == m))
            .cloned()
            .collect())
    }

    async fn get_payment_attempt(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentAttempt>> {
        let state = self.state.lock().await;
        Ok(state.attempt_by_checkout(checkout_request_id).cloned())
    }

    async fn list_payment_attempts(&self, receipt_id: ReceiptId) -> Result<Vec<PaymentAttempt>> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .values()
            .filter(|a| a.receipt_id == receipt_id)
            .cloned()
            .collect())
    }
}

/// Transaction over [`InMemoryLibraryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<LibraryState>,
    // Taken on commit; restored on drop otherwise.
    snapshot: Option<LibraryState>,
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_member(&mut self, id: &MemberId) -> Result<Option<Member>> {
        Ok(self.guard.members.get(id).cloned())
    }

    async fn get_book(&mut self, id: BookId) -> Result<Option<Book>> {
        Ok(self.guard.books.get(&id).cloned())
    }

    async fn decrement_stock(&mut self, id: BookId, by: u32) -> Result<i64> {
        self.guard.decrement_stock(id, by)
    }

    async fn increment_stock(&mut self, id: BookId, by: u32) -> Result<i64> {
        self.guard.increment_stock(id, by)
    }

    async fn insert_loan(&mut self, loan: NewLoan) -> Result<Loan> {
        Ok(self.guard.insert_loan(loan))
    }

    async fn lock_loan(&mut self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self.guard.loans.get(&id).cloned())
    }

    async fn mark_loan_returned(&mut self, id: LoanId, returned_on: DateTime<Utc>) -> Result<Loan> {
        self.guard.mark_loan_returned(id, returned_on)
    }

    async fn insert_receipt(&mut self, receipt: NewReceipt) -> Result<Receipt> {
        Ok(self.guard.insert_receipt(receipt))
    }

    async fn lock_receipt(&mut self, id: ReceiptId) -> Result<Option<Receipt>> {
        Ok(self.guard.receipts.get(&id).cloned())
    }

    async fn mark_receipt_paid(
        &mut self,
        id: ReceiptId,
        payment_reference: &str,
    ) -> Result<Receipt> {
        self.guard.mark_receipt_paid(id, payment_reference)
    }

    async fn insert_payment_attempt(
        &mut self,
        attempt: NewPaymentAttempt,
    ) -> Result<PaymentAttempt> {
        self.guard.insert_payment_attempt(attempt)
    }

    async fn lock_payment_attempt(
        &mut self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentAttempt>> {
        Ok(self.guard.attempt_by_checkout(checkout_request_id).cloned())
    }

    async fn settle_payment_attempt(
        &mut self,
        id: PaymentAttemptId,
        settlement: Settlement,
    ) -> Result<PaymentAttempt> {
        self.guard.settle_payment_attempt(id, settlement)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.snapshot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemberRole;

    fn new_book(isbn: &str, stock: i64) -> NewBook {
        NewBook {
            title: format!("Title {isbn}"),
            author: "Author".to_string(),
            isbn: isbn.to_string(),
            stock,
            price: 100,
        }
    }

    fn member(id: &str) -> Member {
        Member {
            id: MemberId::new(id),
            username: id.to_string(),
            email: format!("{id}@example.com"),
            role: MemberRole::Member,
        }
    }

    #[tokio::test]
    async fn insert_and_get_book() {
        let store = InMemoryLibraryStore::new();
        let book = store.insert_book(new_book("isbn-1", 3)).await.unwrap();
        assert_eq!(book.id, BookId::new(1));

        let fetched = store.get_book(book.id).await.unwrap().unwrap();
        assert_eq!(fetched, book);
        assert_eq!(store.list_books().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_isbn_is_rejected() {
        let store = InMemoryLibraryStore::new();
        store.insert_book(new_book("isbn-1", 3)).await.unwrap();
        let mut dup = new_book("isbn-1", 1);
        dup.title = "Other".to_string();
        let err = store.insert_book(dup).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "book", .. }));
    }

    #[tokio::test]
    async fn duplicate_member_is_rejected() {
        let store = InMemoryLibraryStore::new();
        store.insert_member(member("m1")).await.unwrap();
        let err = store.insert_member(member("m1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "member", .. }));
    }

    #[tokio::test]
    async fn committed_decrement_is_visible() {
        let store = InMemoryLibraryStore::new();
        let book = store.insert_book(new_book("isbn-1", 3)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.decrement_stock(book.id, 2).await.unwrap(), 1);
        tx.commit().await.unwrap();

        assert_eq!(store.get_book(book.id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryLibraryStore::new();
        let book = store.insert_book(new_book("isbn-1", 3)).await.unwrap();
        store.insert_member(member("m1")).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.decrement_stock(book.id, 3).await.unwrap();
            tx.insert_receipt(NewReceipt {
                book_ids: vec![book.id; 3],
                member_id: MemberId::new("m1"),
                total_amount: 300,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        assert_eq!(store.get_book(book.id).await.unwrap().unwrap().stock, 3);
        assert!(store.list_receipts(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn decrement_refuses_to_go_negative() {
        let store = InMemoryLibraryStore::new();
        let book = store.insert_book(new_book("isbn-1", 1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.decrement_stock(book.id, 2).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 2,
                available: 1,
                ..
            }
        ));
        drop(tx);

        assert_eq!(store.get_book(book.id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn decrement_unknown_book_is_not_found() {
        let store = InMemoryLibraryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx.decrement_stock(BookId::new(99), 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "book", .. }));
    }

    #[tokio::test]
    async fn checkout_reference_is_unique() {
        let store = InMemoryLibraryStore::new();
        let attempt = NewPaymentAttempt {
            checkout_request_id: "ws_CO_1".to_string(),
            receipt_id: ReceiptId::new(1),
            member_id: MemberId::new("m1"),
            amount: 100,
            phone: "254700000000".to_string(),
            created_at: Utc::now(),
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_payment_attempt(attempt.clone()).await.unwrap();
        let err = tx.insert_payment_attempt(attempt).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        tx.commit().await.unwrap();

        assert_eq!(store.payment_attempt_count().await, 1);
        assert!(store.get_payment_attempt("ws_CO_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_loans_filters_by_member() {
        let store = InMemoryLibraryStore::new();
        let book = store.insert_book(new_book("isbn-1", 5)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        for who in ["m1", "m2", "m1"] {
            tx.insert_loan(NewLoan {
                book_id: book.id,
                member_id: MemberId::new(who),
                borrowed_on: Utc::now(),
                due_on: Utc::now(),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let m1 = MemberId::new("m1");
        assert_eq!(store.list_loans(Some(&m1)).await.unwrap().len(), 2);
        assert_eq!(store.list_loans(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn clear_resets_sequences() {
        let store = InMemoryLibraryStore::new();
        store.insert_book(new_book("isbn-1", 1)).await.unwrap();
        store.clear().await;
        let book = store.insert_book(new_book("isbn-2", 1)).await.unwrap();
        assert_eq!(book.id, BookId::new(1));
    }
}
