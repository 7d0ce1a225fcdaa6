//! Borrowing and returning individual copies.

use chrono::{Duration, Utc};
use common::{BookId, LoanId, MemberId};
use serde::Serialize;
use store::{LibraryStore, Loan, NewLoan, StoreError};

use crate::catalog::{BookSummary, summarize_books};
use crate::error::{DomainError, Result};

/// How long a member may keep a borrowed copy.
pub const LOAN_PERIOD_DAYS: i64 = 14;

/// A loan together with the book it refers to.
///
/// `book` is `None` once the title has been removed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub book: Option<BookSummary>,
}

/// Service owning the loan state machine.
///
/// Every stock change is made in the same store transaction as the loan
/// write it belongs to, so stock always matches the outstanding loans.
pub struct LendingService<S: LibraryStore> {
    store: S,
}

impl<S: LibraryStore> LendingService<S> {
    /// Creates a new lending service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lends one copy of a book to a member.
    #[tracing::instrument(skip(self))]
    pub async fn borrow(&self, book_id: BookId, member_id: &MemberId) -> Result<Loan> {
        let mut tx = self.store.begin().await?;

        if tx.get_member(member_id).await?.is_none() {
            return Err(DomainError::not_found("member", member_id));
        }

        match tx.decrement_stock(book_id, 1).await {
            Ok(remaining) => tracing::debug!(remaining, "copy taken off the shelf"),
            Err(StoreError::NotFound { .. } | StoreError::InsufficientStock { .. }) => {
                return Err(DomainError::OutOfStock(book_id));
            }
            Err(e) => return Err(e.into()),
        }

        let now = Utc::now();
        let loan = tx
            .insert_loan(NewLoan {
                book_id,
                member_id: member_id.clone(),
                borrowed_on: now,
                due_on: now + Duration::days(LOAN_PERIOD_DAYS),
            })
            .await?;
        tx.commit().await?;

        metrics::counter!("loans_total").increment(1);
        tracing::info!(loan_id = %loan.id, "book borrowed");
        Ok(loan)
    }

    /// Closes a loan and puts the copy back on the shelf.
    #[tracing::instrument(skip(self))]
    pub async fn return_loan(&self, loan_id: LoanId) -> Result<Loan> {
        let mut tx = self.store.begin().await?;

        let loan = tx
            .lock_loan(loan_id)
            .await?
            .ok_or_else(|| DomainError::not_found("loan", loan_id))?;
        if !loan.status.can_return() {
            return Err(DomainError::AlreadyReturned(loan_id));
        }

        let returned = tx.mark_loan_returned(loan_id, Utc::now()).await?;
        match tx.increment_stock(loan.book_id, 1).await {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(
                    book_id = %loan.book_id,
                    "returned copy belongs to a book no longer in the catalog"
                );
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        metrics::counter!("returns_total").increment(1);
        tracing::info!(book_id = %loan.book_id, "book returned");
        Ok(returned)
    }

    /// Returns a single loan or `NotFound`.
    pub async fn get_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.store
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| DomainError::not_found("loan", loan_id))
    }

    /// Lists a member's loans with their books resolved.
    pub async fn loans_for_member(&self, member_id: &MemberId) -> Result<Vec<LoanDetails>> {
        let loans = self.store.list_loans(Some(member_id)).await?;
        self.with_books(loans).await
    }

    /// Lists every loan with its book resolved.
    pub async fn all_loans(&self) -> Result<Vec<LoanDetails>> {
        let loans = self.store.list_loans(None).await?;
        self.with_books(loans).await
    }

    async fn with_books(&self, loans: Vec<Loan>) -> Result<Vec<LoanDetails>> {
        let books = summarize_books(
            &self.store,
            loans.iter().map(|l| l.book_id).collect::<Vec<_>>(),
        )
        .await?;
        Ok(loans
            .into_iter()
            .map(|loan| LoanDetails {
                book: books.get(&loan.book_id).cloned(),
                loan,
            })
            .collect())
    }
}
