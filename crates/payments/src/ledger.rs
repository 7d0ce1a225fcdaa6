//! Read-only receipt listings.

use common::{BookId, MemberId, ReceiptId};
use domain::{DomainError, summarize_books};
use serde::Serialize;
use store::{LibraryStore, PaymentAttempt, Receipt};

use crate::error::Result;

/// A purchased copy with its title and author, when still in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptItem {
    pub book_id: BookId,
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptDetails {
    #[serde(flatten)]
    pub receipt: Receipt,
    pub items: Vec<ReceiptItem>,
}

/// Lists receipts with their books resolved.
pub struct ReceiptLedger<S: LibraryStore> {
    store: S,
}

impl<S: LibraryStore> ReceiptLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn receipts_for_member(&self, member_id: &MemberId) -> Result<Vec<ReceiptDetails>> {
        let receipts = self.store.list_receipts(Some(member_id)).await?;
        self.with_items(receipts).await
    }

    pub async fn all_receipts(&self) -> Result<Vec<ReceiptDetails>> {
        let receipts = self.store.list_receipts(None).await?;
        self.with_items(receipts).await
    }

    /// Returns every payment attempt made for a receipt, oldest first.
    pub async fn attempts(&self, receipt_id: ReceiptId) -> Result<Vec<PaymentAttempt>> {
        if self.store.get_receipt(receipt_id).await?.is_none() {
            return Err(DomainError::not_found("receipt", receipt_id).into());
        }
        Ok(self.store.list_payment_attempts(receipt_id).await?)
    }

    async fn with_items(&self, receipts: Vec<Receipt>) -> Result<Vec<ReceiptDetails>> {
        let books = summarize_books(
            &self.store,
            receipts
                .iter()
                .flat_map(|r| r.book_ids.iter().copied())
                .collect::<Vec<_>>(),
        )
        .await?;

        Ok(receipts
            .into_iter()
            .map(|receipt| {
                let items = receipt
                    .book_ids
                    .iter()
                    .map(|id| {
                        let book = books.get(id);
                        ReceiptItem {
                            book_id: *id,
                            title: book.map(|b| b.title.clone()),
                            author: book.map(|b| b.author.clone()),
                        }
                    })
                    .collect();
                ReceiptDetails { receipt, items }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use store::{InMemoryLibraryStore, NewBook, NewReceipt};

    use super::*;

    #[tokio::test]
    async fn test_listings_resolve_titles_and_keep_missing_ids() {
        let store = InMemoryLibraryStore::new();
        let book = store
            .insert_book(NewBook {
                title: "Weep Not, Child".to_string(),
                author: "Ngugi wa Thiong'o".to_string(),
                isbn: "978-0143106692".to_string(),
                stock: 3,
                price: 100,
            })
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let receipt = tx
            .insert_receipt(NewReceipt {
                book_ids: vec![book.id, book.id, BookId::new(77)],
                member_id: MemberId::new("m1"),
                total_amount: 300,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let ledger = ReceiptLedger::new(store.clone());
        let mine = ledger
            .receipts_for_member(&MemberId::new("m1"))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].items.len(), 3);
        assert_eq!(mine[0].items[0].title.as_deref(), Some("Weep Not, Child"));
        assert!(mine[0].items[2].title.is_none());

        assert!(
            ledger
                .receipts_for_member(&MemberId::new("m2"))
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(ledger.all_receipts().await.unwrap().len(), 1);
        assert!(ledger.attempts(receipt.id).await.unwrap().is_empty());
        assert!(ledger.attempts(ReceiptId::new(99)).await.is_err());
    }
}
