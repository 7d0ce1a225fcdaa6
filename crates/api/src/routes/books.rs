//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::BookId;
use payments::PaymentGateway;
use store::{Book, LibraryStore, NewBook};

use super::{AppState, MessageResponse};
use crate::error::ApiError;

/// POST /admin/add_book — adds a title to the catalog.
#[tracing::instrument(skip(state, book))]
pub async fn add<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    book: Result<Json<NewBook>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let Json(book) = book?;
    let book = state.catalog.add_book(book).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// GET /books/get_all — lists the catalog with current stock.
pub async fn list<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
) -> Result<Json<Vec<Book>>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    Ok(Json(state.catalog.list_books().await?))
}

/// GET /books/delete/{bookId} — removes a title.
#[tracing::instrument(skip(state))]
pub async fn delete<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let Path(book_id) = path?;
    state.catalog.delete_book(BookId::new(book_id)).await?;
    Ok(Json(MessageResponse {
        message: "Book deleted",
    }))
}
