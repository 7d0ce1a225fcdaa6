use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    Book, BookId, Loan, LoanId, Member, MemberId, NewBook, NewLoan, NewPaymentAttempt, NewReceipt,
    PaymentAttempt, PaymentAttemptId, Receipt, ReceiptId, Result, Settlement, StoreError,
    store::{LibraryStore, StoreTransaction},
};

const BOOK_COLUMNS: &str = "id, title, author, isbn, stock, price";
const LOAN_COLUMNS: &str = "id, book_id, member_id, borrowed_on, due_on, returned_on, status";
const RECEIPT_COLUMNS: &str =
    "id, book_ids, member_id, total_amount, status, payment_reference, created_at";
const ATTEMPT_COLUMNS: &str = "id, checkout_request_id, receipt_id, member_id, amount, phone, \
     status, gateway_receipt_number, result_description, created_at";

/// PostgreSQL-backed library store.
///
/// Stock decrements are conditional updates and `lock_*` reads use
/// `SELECT ... FOR UPDATE`, so concurrent requests serialize per row.
#[derive(Clone)]
pub struct PostgresLibraryStore {
    pool: PgPool,
}

impl PostgresLibraryStore {
    /// Creates a new PostgreSQL library store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

fn parse_status<T: std::str::FromStr<Err = String>>(row: &PgRow) -> Result<T> {
    let raw: String = row.try_get("status")?;
    raw.parse().map_err(StoreError::Corrupt)
}

fn row_to_member(row: PgRow) -> Result<Member> {
    let role: String = row.try_get("role")?;
    Ok(Member {
        id: MemberId::new(row.try_get::<String, _>("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        role: role.parse().map_err(StoreError::Corrupt)?,
    })
}

fn row_to_book(row: PgRow) -> Result<Book> {
    Ok(Book {
        id: BookId::new(row.try_get("id")?),
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        isbn: row.try_get("isbn")?,
        stock: row.try_get("stock")?,
        price: row.try_get("price")?,
    })
}

fn row_to_loan(row: PgRow) -> Result<Loan> {
    Ok(Loan {
        id: LoanId::new(row.try_get("id")?),
        book_id: BookId::new(row.try_get("book_id")?),
        member_id: MemberId::new(row.try_get::<String, _>("member_id")?),
        borrowed_on: row.try_get("borrowed_on")?,
        due_on: row.try_get("due_on")?,
        returned_on: row.try_get("returned_on")?,
        status: parse_status(&row)?,
    })
}

fn row_to_receipt(row: PgRow) -> Result<Receipt> {
    let book_ids: Vec<i64> = row.try_get("book_ids")?;
    Ok(Receipt {
        id: ReceiptId::new(row.try_get("id")?),
        book_ids: book_ids.into_iter().map(BookId::new).collect(),
        member_id: MemberId::new(row.try_get::<String, _>("member_id")?),
        total_amount: row.try_get("total_amount")?,
        status: parse_status(&row)?,
        payment_reference: row.try_get("payment_reference")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_attempt(row: PgRow) -> Result<PaymentAttempt> {
    Ok(PaymentAttempt {
        id: PaymentAttemptId::new(row.try_get("id")?),
        checkout_request_id: row.try_get("checkout_request_id")?,
        receipt_id: ReceiptId::new(row.try_get("receipt_id")?),
        member_id: MemberId::new(row.try_get::<String, _>("member_id")?),
        amount: row.try_get("amount")?,
        phone: row.try_get("phone")?,
        status: parse_status(&row)?,
        gateway_receipt_number: row.try_get("gateway_receipt_number")?,
        result_description: row.try_get("result_description")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Maps a unique-constraint violation to `Duplicate`, anything else to `Database`.
fn map_unique(e: sqlx::Error, entity: &'static str, key: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Duplicate {
            entity,
            key: key.to_string(),
        };
    }
    StoreError::Database(e)
}

#[async_trait]
impl LibraryStore for PostgresLibraryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn insert_member(&self, member: Member) -> Result<Member> {
        sqlx::query("INSERT INTO members (id, username, email, role) VALUES ($1, $2, $3, $4)")
            .bind(member.id.as_str())
            .bind(&member.username)
            .bind(&member.email)
            .bind(member.role.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, "member", member.id.as_str()))?;
        Ok(member)
    }

    async fn get_member(&self, id: &MemberId) -> Result<Option<Member>> {
        sqlx::query("SELECT id, username, email, role FROM members WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_member)
            .transpose()
    }

    async fn insert_book(&self, book: NewBook) -> Result<Book> {
        let row = sqlx::query(&format!(
            "INSERT INTO books (title, author, isbn, stock, price) VALUES ($1, $2, $3, $4, $5) \
             RETURNING {BOOK_COLUMNS}"
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.stock)
        .bind(book.price)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, "book", &book.isbn))?;
        row_to_book(row)
    }

    async fn get_book(&self, id: BookId) -> Result<Option<Book>> {
        sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_book)
            .transpose()
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        let rows = sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_book).collect()
    }

    async fn delete_book(&self, id: BookId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        sqlx::query(&format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_loan)
            .transpose()
    }

    async fn list_loans(&self, member_id: Option<&MemberId>) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans \
             WHERE ($1::TEXT IS NULL OR member_id = $1) ORDER BY id ASC"
        ))
        .bind(member_id.map(MemberId::as_str))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_loan).collect()
    }

    async fn get_receipt(&self, id: ReceiptId) -> Result<Option<Receipt>> {
        sqlx::query(&format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_receipt)
            .transpose()
    }

    async fn list_receipts(&self, member_id: Option<&MemberId>) -> Result<Vec<Receipt>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts \
             WHERE ($1::TEXT IS NULL OR member_id = $1) ORDER BY id ASC"
        ))
        .bind(member_id.map(MemberId::as_str))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_receipt).collect()
    }

    async fn get_payment_attempt(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentAttempt>> {
        sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE checkout_request_id = $1"
        ))
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_attempt)
        .transpose()
    }

    async fn list_payment_attempts(&self, receipt_id: ReceiptId) -> Result<Vec<PaymentAttempt>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts WHERE receipt_id = $1 ORDER BY id ASC"
        ))
        .bind(receipt_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_attempt).collect()
    }
}

/// Transaction over [`PostgresLibraryStore`]. Dropping it without
/// committing rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get_member(&mut self, id: &MemberId) -> Result<Option<Member>> {
        sqlx::query("SELECT id, username, email, role FROM members WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(row_to_member)
            .transpose()
    }

    async fn get_book(&mut self, id: BookId) -> Result<Option<Book>> {
        sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(row_to_book)
            .transpose()
    }

    async fn decrement_stock(&mut self, id: BookId, by: u32) -> Result<i64> {
        let remaining: Option<i64> = sqlx::query_scalar(
            "UPDATE books SET stock = stock - $2 WHERE id = $1 AND stock >= $2 RETURNING stock",
        )
        .bind(id.as_i64())
        .bind(i64::from(by))
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(remaining);
        }

        // Refused: tell a missing book apart from a short shelf.
        let available: Option<i64> = sqlx::query_scalar("SELECT stock FROM books WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        tracing::debug!(book_id = %id, requested = by, ?available, "stock decrement refused");
        match available {
            Some(available) => Err(StoreError::InsufficientStock {
                book_id: id,
                requested: by,
                available,
            }),
            None => Err(StoreError::not_found("book", id)),
        }
    }

    async fn increment_stock(&mut self, id: BookId, by: u32) -> Result<i64> {
        let stock: Option<i64> =
            sqlx::query_scalar("UPDATE books SET stock = stock + $2 WHERE id = $1 RETURNING stock")
                .bind(id.as_i64())
                .bind(i64::from(by))
                .fetch_optional(&mut *self.tx)
                .await?;
        stock.ok_or_else(|| StoreError::not_found("book", id))
    }

    async fn insert_loan(&mut self, loan: NewLoan) -> Result<Loan> {
        let row = sqlx::query(&format!(
            "INSERT INTO loans (book_id, member_id, borrowed_on, due_on, status) \
             VALUES ($1, $2, $3, $4, 'Active') RETURNING {LOAN_COLUMNS}"
        ))
        .bind(loan.book_id.as_i64())
        .bind(loan.member_id.as_str())
        .bind(loan.borrowed_on)
        .bind(loan.due_on)
        .fetch_one(&mut *self.tx)
        .await?;
        row_to_loan(row)
    }

    async fn lock_loan(&mut self, id: LoanId) -> Result<Option<Loan>> {
        sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_loan)
        .transpose()
    }

    async fn mark_loan_returned(&mut self, id: LoanId, returned_on: DateTime<Utc>) -> Result<Loan> {
        sqlx::query(&format!(
            "UPDATE loans SET status = 'Returned', returned_on = $2 WHERE id = $1 \
             RETURNING {LOAN_COLUMNS}"
        ))
        .bind(id.as_i64())
        .bind(returned_on)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_loan)
        .transpose()?
        .ok_or_else(|| StoreError::not_found("loan", id))
    }

    async fn insert_receipt(&mut self, receipt: NewReceipt) -> Result<Receipt> {
        let book_ids: Vec<i64> = receipt.book_ids.iter().map(BookId::as_i64).collect();
        let row = sqlx::query(&format!(
            "INSERT INTO receipts (book_ids, member_id, total_amount, status, created_at) \
             VALUES ($1, $2, $3, 'Unpaid', $4) RETURNING {RECEIPT_COLUMNS}"
        ))
        .bind(book_ids)
        .bind(receipt.member_id.as_str())
        .bind(receipt.total_amount)
        .bind(receipt.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        row_to_receipt(row)
    }

    async fn lock_receipt(&mut self, id: ReceiptId) -> Result<Option<Receipt>> {
        sqlx::query(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_receipt)
        .transpose()
    }

    async fn mark_receipt_paid(
        &mut self,
        id: ReceiptId,
        payment_reference: &str,
    ) -> Result<Receipt> {
        sqlx::query(&format!(
            "UPDATE receipts SET status = 'Paid', payment_reference = $2 WHERE id = $1 \
             RETURNING {RECEIPT_COLUMNS}"
        ))
        .bind(id.as_i64())
        .bind(payment_reference)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_receipt)
        .transpose()?
        .ok_or_else(|| StoreError::not_found("receipt", id))
    }

    async fn insert_payment_attempt(
        &mut self,
        attempt: NewPaymentAttempt,
    ) -> Result<PaymentAttempt> {
        let row = sqlx::query(&format!(
            "INSERT INTO payment_attempts \
             (checkout_request_id, receipt_id, member_id, amount, phone, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'Pending', $6) RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(&attempt.checkout_request_id)
        .bind(attempt.receipt_id.as_i64())
        .bind(attempt.member_id.as_str())
        .bind(attempt.amount)
        .bind(&attempt.phone)
        .bind(attempt.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_unique(e, "payment attempt", &attempt.checkout_request_id))?;
        row_to_attempt(row)
    }

    async fn lock_payment_attempt(
        &mut self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentAttempt>> {
        sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM payment_attempts \
             WHERE checkout_request_id = $1 FOR UPDATE"
        ))
        .bind(checkout_request_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_attempt)
        .transpose()
    }

    async fn settle_payment_attempt(
        &mut self,
        id: PaymentAttemptId,
        settlement: Settlement,
    ) -> Result<PaymentAttempt> {
        sqlx::query(&format!(
            "UPDATE payment_attempts \
             SET status = $2, gateway_receipt_number = $3, result_description = $4 \
             WHERE id = $1 RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(id.as_i64())
        .bind(settlement.status.as_str())
        .bind(settlement.gateway_receipt_number)
        .bind(settlement.result_description)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_attempt)
        .transpose()?
        .ok_or_else(|| StoreError::not_found("payment attempt", id))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}
