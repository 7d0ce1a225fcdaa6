//! Member registration and catalog maintenance.
//!
//! These are thin pass-throughs to the store: they validate input, translate
//! uniqueness violations and otherwise carry no invariants of their own.

use std::collections::HashMap;

use common::{BookId, MemberId};
use serde::{Deserialize, Serialize};
use store::{Book, LibraryStore, Member, NewBook, StoreError};

use crate::error::{DomainError, Result};

/// Title and author shown next to a book id in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub id: BookId,
    pub title: String,
    pub author: String,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }
}

/// Looks up every distinct book id once.
///
/// Ids of books no longer in the catalog are absent from the returned map.
pub async fn summarize_books<S>(
    store: &S,
    ids: impl IntoIterator<Item = BookId>,
) -> std::result::Result<HashMap<BookId, BookSummary>, StoreError>
where
    S: LibraryStore + ?Sized,
{
    let mut summaries = HashMap::new();
    let mut missing = Vec::new();
    for id in ids {
        if summaries.contains_key(&id) || missing.contains(&id) {
            continue;
        }
        match store.get_book(id).await? {
            Some(book) => {
                summaries.insert(id, BookSummary::from(&book));
            }
            None => missing.push(id),
        }
    }
    Ok(summaries)
}

/// Service for members and catalog titles.
pub struct CatalogService<S: LibraryStore> {
    store: S,
}

impl<S: LibraryStore> CatalogService<S> {
    /// Creates a new catalog service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers a member issued by the external sign-in provider.
    #[tracing::instrument(skip(self, member), fields(member_id = %member.id))]
    pub async fn register_member(&self, member: Member) -> Result<Member> {
        if member.id.as_str().trim().is_empty() {
            return Err(DomainError::validation("member id is required"));
        }
        if member.username.trim().is_empty() {
            return Err(DomainError::validation("username is required"));
        }
        if !member.email.contains('@') {
            return Err(DomainError::validation(format!(
                "invalid email address: {}",
                member.email
            )));
        }

        match self.store.insert_member(member).await {
            Ok(member) => {
                tracing::info!("member registered");
                Ok(member)
            }
            Err(StoreError::Duplicate { key, .. }) => Err(DomainError::validation(format!(
                "member {key} is already registered"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns a member or `NotFound`.
    pub async fn get_member(&self, id: &MemberId) -> Result<Member> {
        self.store
            .get_member(id)
            .await?
            .ok_or_else(|| DomainError::not_found("member", id))
    }

    /// Adds a title with its initial stock.
    #[tracing::instrument(skip(self, book), fields(isbn = %book.isbn))]
    pub async fn add_book(&self, book: NewBook) -> Result<Book> {
        if book.title.trim().is_empty() {
            return Err(DomainError::validation("title is required"));
        }
        if book.isbn.trim().is_empty() {
            return Err(DomainError::validation("isbn is required"));
        }
        if book.stock < 0 {
            return Err(DomainError::validation(format!(
                "stock must not be negative, got {}",
                book.stock
            )));
        }
        if book.price < 0 {
            return Err(DomainError::validation(format!(
                "price must not be negative, got {}",
                book.price
            )));
        }

        match self.store.insert_book(book).await {
            Ok(book) => {
                tracing::info!(book_id = %book.id, "book added");
                Ok(book)
            }
            Err(StoreError::Duplicate { key, .. }) => Err(DomainError::validation(format!(
                "a book with isbn or title {key} already exists"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_books(&self) -> Result<Vec<Book>> {
        Ok(self.store.list_books().await?)
    }

    pub async fn get_book(&self, id: BookId) -> Result<Book> {
        self.store
            .get_book(id)
            .await?
            .ok_or_else(|| DomainError::not_found("book", id))
    }

    /// Removes a title from the catalog.
    #[tracing::instrument(skip(self))]
    pub async fn delete_book(&self, id: BookId) -> Result<()> {
        if !self.store.delete_book(id).await? {
            return Err(DomainError::not_found("book", id));
        }
        tracing::info!("book deleted");
        Ok(())
    }
}
