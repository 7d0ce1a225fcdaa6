//! Borrow and return endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use common::{BookId, LoanId, MemberId};
use domain::LoanDetails;
use payments::PaymentGateway;
use serde::Serialize;
use store::{LibraryStore, Loan};

use super::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct LoanResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub loan: Loan,
}

/// GET /books/borrow/{memberId}/{bookId} — lends one copy.
#[tracing::instrument(skip(state))]
pub async fn borrow<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<Json<LoanResponse>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let Path((member_id, book_id)) = path?;
    let loan = state
        .lending
        .borrow(BookId::new(book_id), &MemberId::new(member_id))
        .await?;
    Ok(Json(LoanResponse {
        message: "Book borrowed successfully!",
        status: "success",
        loan,
    }))
}

/// GET /book/mark_returned/{loanId} — closes a loan.
#[tracing::instrument(skip(state))]
pub async fn mark_returned<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<LoanResponse>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let Path(loan_id) = path?;
    let loan = state.lending.return_loan(LoanId::new(loan_id)).await?;
    Ok(Json(LoanResponse {
        message: "Book returned successfully!",
        status: "success",
        loan,
    }))
}

/// GET /user/get_borrowed_books/{memberId}
pub async fn for_member<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    Path(member_id): Path<String>,
) -> Result<Json<Vec<LoanDetails>>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let loans = state
        .lending
        .loans_for_member(&MemberId::new(member_id))
        .await?;
    Ok(Json(loans))
}

/// GET /admin/get_borrowed_books
pub async fn all<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
) -> Result<Json<Vec<LoanDetails>>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    Ok(Json(state.lending.all_loans().await?))
}
