//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container. Each test gets its own
//! database, so they can run in parallel:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use sqlx::PgPool;
use store::{
    BookId, LibraryStore, LoanStatus, Member, MemberId, MemberRole, NewBook, NewLoan,
    NewPaymentAttempt, NewReceipt, PaymentStatus, PostgresLibraryStore, ReceiptId, ReceiptStatus,
    Settlement, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    server_url: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

static NEXT_DATABASE: AtomicUsize = AtomicUsize::new(0);

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            Arc::new(ContainerInfo {
                container,
                server_url: format!("postgres://postgres:postgres@{}:{}", host, port),
            })
        })
        .await
        .clone()
}

/// Get a fresh store backed by its own migrated database
async fn get_test_store() -> PostgresLibraryStore {
    let info = get_container_info().await;
    let name = format!(
        "store_test_{}",
        NEXT_DATABASE.fetch_add(1, Ordering::Relaxed)
    );

    let admin = PgPool::connect(&format!("{}/postgres", info.server_url))
        .await
        .unwrap();
    sqlx::query(&format!("CREATE DATABASE {name}"))
        .execute(&admin)
        .await
        .unwrap();
    admin.close().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&format!("{}/{name}", info.server_url))
        .await
        .unwrap();

    let store = PostgresLibraryStore::new(pool);
    store.run_migrations().await.unwrap();
    store
}

async fn seed(store: &PostgresLibraryStore, stock: i64) -> (MemberId, BookId) {
    let member = store
        .insert_member(Member {
            id: MemberId::new("member-1"),
            username: "reader".to_string(),
            email: "reader@example.com".to_string(),
            role: MemberRole::Member,
        })
        .await
        .unwrap();
    let book = store
        .insert_book(NewBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: "978-0441013593".to_string(),
            stock,
            price: 100,
        })
        .await
        .unwrap();
    (member.id, book.id)
}

#[tokio::test]
async fn insert_and_read_catalog() {
    let store = get_test_store().await;
    let (member_id, book_id) = seed(&store, 5).await;

    let book = store.get_book(book_id).await.unwrap().unwrap();
    assert_eq!(book.title, "Dune");
    assert_eq!(book.stock, 5);

    let member = store.get_member(&member_id).await.unwrap().unwrap();
    assert_eq!(member.role, MemberRole::Member);

    assert_eq!(store.list_books().await.unwrap().len(), 1);
    assert!(store.delete_book(book_id).await.unwrap());
    assert!(!store.delete_book(book_id).await.unwrap());
}

#[tokio::test]
async fn duplicate_isbn_maps_to_duplicate() {
    let store = get_test_store().await;
    seed(&store, 1).await;

    let err = store
        .insert_book(NewBook {
            title: "Dune Messiah".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: "978-0441013593".to_string(),
            stock: 1,
            price: 100,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { entity: "book", .. }));
}

#[tokio::test]
async fn conditional_decrement_never_goes_negative() {
    let store = get_test_store().await;
    let (_, book_id) = seed(&store, 2).await;

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.decrement_stock(book_id, 2).await.unwrap(), 0);
    let err = tx.decrement_stock(book_id, 1).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock { available: 0, .. }
    ));
    tx.commit().await.unwrap();

    assert_eq!(store.get_book(book_id).await.unwrap().unwrap().stock, 0);
}

#[tokio::test]
async fn decrement_unknown_book_is_not_found() {
    let store = get_test_store().await;
    let mut tx = store.begin().await.unwrap();
    let err = tx.decrement_stock(BookId::new(404), 1).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "book", .. }));
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
    let store = get_test_store().await;
    let (member_id, book_id) = seed(&store, 3).await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.decrement_stock(book_id, 3).await.unwrap();
        tx.insert_receipt(NewReceipt {
            book_ids: vec![book_id; 3],
            member_id: member_id.clone(),
            total_amount: 300,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    }

    assert_eq!(store.get_book(book_id).await.unwrap().unwrap().stock, 3);
    assert!(store.list_receipts(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn loan_return_roundtrip() {
    let store = get_test_store().await;
    let (member_id, book_id) = seed(&store, 1).await;

    let mut tx = store.begin().await.unwrap();
    tx.decrement_stock(book_id, 1).await.unwrap();
    let loan = tx
        .insert_loan(NewLoan {
            book_id,
            member_id: member_id.clone(),
            borrowed_on: Utc::now(),
            due_on: Utc::now() + chrono::Duration::days(14),
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);

    let mut tx = store.begin().await.unwrap();
    let locked = tx.lock_loan(loan.id).await.unwrap().unwrap();
    assert!(locked.status.can_return());
    let returned = tx.mark_loan_returned(loan.id, Utc::now()).await.unwrap();
    tx.increment_stock(book_id, 1).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert!(returned.returned_on.is_some());
    assert_eq!(store.get_book(book_id).await.unwrap().unwrap().stock, 1);
    assert_eq!(store.list_loans(Some(&member_id)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn receipt_and_attempt_settlement() {
    let store = get_test_store().await;
    let (member_id, book_id) = seed(&store, 5).await;

    let mut tx = store.begin().await.unwrap();
    let receipt = tx
        .insert_receipt(NewReceipt {
            book_ids: vec![book_id, book_id],
            member_id: member_id.clone(),
            total_amount: 200,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    let attempt = tx
        .insert_payment_attempt(NewPaymentAttempt {
            checkout_request_id: "ws_CO_191220191020363925".to_string(),
            receipt_id: receipt.id,
            member_id: member_id.clone(),
            amount: 200,
            phone: "254708374149".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(receipt.book_ids, vec![book_id, book_id]);
    assert_eq!(attempt.status, PaymentStatus::Pending);

    let mut tx = store.begin().await.unwrap();
    let locked = tx
        .lock_payment_attempt("ws_CO_191220191020363925")
        .await
        .unwrap()
        .unwrap();
    tx.settle_payment_attempt(
        locked.id,
        Settlement {
            status: PaymentStatus::Succeeded,
            gateway_receipt_number: Some("NLJ7RT61SV".to_string()),
            result_description: Some("The service request is processed successfully.".to_string()),
        },
    )
    .await
    .unwrap();
    tx.lock_receipt(receipt.id).await.unwrap().unwrap();
    tx.mark_receipt_paid(receipt.id, "NLJ7RT61SV").await.unwrap();
    tx.commit().await.unwrap();

    let receipt = store.get_receipt(receipt.id).await.unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Paid);
    assert_eq!(receipt.payment_reference.as_deref(), Some("NLJ7RT61SV"));

    let attempts = store.list_payment_attempts(receipt.id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, PaymentStatus::Succeeded);
}

#[tokio::test]
async fn duplicate_checkout_reference_is_rejected() {
    let store = get_test_store().await;
    let (member_id, _) = seed(&store, 1).await;

    let mut tx = store.begin().await.unwrap();
    let receipt = tx
        .insert_receipt(NewReceipt {
            book_ids: vec![],
            member_id: member_id.clone(),
            total_amount: 0,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let attempt = NewPaymentAttempt {
        checkout_request_id: "ws_CO_dup".to_string(),
        receipt_id: receipt.id,
        member_id,
        amount: 0,
        phone: "254708374149".to_string(),
        created_at: Utc::now(),
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_payment_attempt(attempt.clone()).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx.insert_payment_attempt(attempt).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }));
}

async fn pending_attempt(
    store: &PostgresLibraryStore,
    member_id: &MemberId,
    reference: &str,
) -> ReceiptId {
    let mut tx = store.begin().await.unwrap();
    let receipt = tx
        .insert_receipt(NewReceipt {
            book_ids: vec![],
            member_id: member_id.clone(),
            total_amount: 100,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    tx.insert_payment_attempt(NewPaymentAttempt {
        checkout_request_id: reference.to_string(),
        receipt_id: receipt.id,
        member_id: member_id.clone(),
        amount: 100,
        phone: "254708374149".to_string(),
        created_at: Utc::now(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();
    receipt.id
}

/// Takes one copy and writes a receipt for it in a single transaction.
async fn buy_one(
    store: PostgresLibraryStore,
    member_id: MemberId,
    book_id: BookId,
) -> Result<(), StoreError> {
    let mut tx = store.begin().await?;
    tx.decrement_stock(book_id, 1).await?;
    tx.insert_receipt(NewReceipt {
        book_ids: vec![book_id],
        member_id,
        total_amount: 100,
        created_at: Utc::now(),
    })
    .await?;
    tx.commit().await
}

/// Settles a pending attempt and pays its receipt. Returns false when the
/// attempt was already settled.
async fn settle(store: PostgresLibraryStore, reference: &'static str) -> Result<bool, StoreError> {
    let mut tx = store.begin().await?;
    let attempt = tx
        .lock_payment_attempt(reference)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "payment attempt",
            id: reference.to_string(),
        })?;
    if !attempt.status.can_settle() {
        return Ok(false);
    }
    tx.settle_payment_attempt(
        attempt.id,
        Settlement {
            status: PaymentStatus::Succeeded,
            gateway_receipt_number: Some("NLJ7RT61SV".to_string()),
            result_description: None,
        },
    )
    .await?;
    tx.lock_receipt(attempt.receipt_id).await?;
    tx.mark_receipt_paid(attempt.receipt_id, "NLJ7RT61SV").await?;
    tx.commit().await?;
    Ok(true)
}

#[tokio::test]
async fn concurrent_last_copy_is_sold_once() {
    let store = get_test_store().await;
    let (member_id, book_id) = seed(&store, 1).await;

    let handles: Vec<_> = (0..4)
        .map(|_| tokio::spawn(buy_one(store.clone(), member_id.clone(), book_id)))
        .collect();

    let mut sold = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => sold += 1,
            Err(StoreError::InsufficientStock { available: 0, .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(sold, 1);
    assert_eq!(store.get_book(book_id).await.unwrap().unwrap().stock, 0);
    assert_eq!(store.list_receipts(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_settlement_applies_once() {
    let store = get_test_store().await;
    let (member_id, _) = seed(&store, 1).await;
    let receipt_id = pending_attempt(&store, &member_id, "ws_CO_race").await;

    let handles: Vec<_> = (0..4)
        .map(|_| tokio::spawn(settle(store.clone(), "ws_CO_race")))
        .collect();

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    let receipt = store.get_receipt(receipt_id).await.unwrap().unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Paid);
    let attempt = store.get_payment_attempt("ws_CO_race").await.unwrap().unwrap();
    assert_eq!(attempt.status, PaymentStatus::Succeeded);
}
