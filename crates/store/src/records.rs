//! Rows persisted by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    BookId, LoanId, LoanStatus, MemberId, PaymentAttemptId, PaymentStatus, ReceiptId,
    ReceiptStatus,
};

/// Role flag carried by a member record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MemberRole {
    #[default]
    Member,
    Admin,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Member => "Member",
            MemberRole::Admin => "Admin",
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Member" => Ok(MemberRole::Member),
            "Admin" => Ok(MemberRole::Admin),
            other => Err(format!("unknown member role: {other}")),
        }
    }
}

/// A registered library member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub username: String,
    pub email: String,
    pub role: MemberRole,
}

/// A catalog title together with its remaining stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    /// Copies on the shelf. Never negative.
    pub stock: i64,
    /// Unit price in minor currency units.
    pub price: i64,
}

/// A book to add to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub stock: i64,
    pub price: i64,
}

/// One borrowed copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub borrowed_on: DateTime<Utc>,
    pub due_on: DateTime<Utc>,
    pub returned_on: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub book_id: BookId,
    pub member_id: MemberId,
    pub borrowed_on: DateTime<Utc>,
    pub due_on: DateTime<Utc>,
}

/// A purchase intent and its payment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    /// Purchased book ids in cart order, one entry per copy.
    pub book_ids: Vec<BookId>,
    pub member_id: MemberId,
    pub total_amount: i64,
    pub status: ReceiptStatus,
    /// Gateway receipt number of the payment that settled this receipt.
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReceipt {
    pub book_ids: Vec<BookId>,
    pub member_id: MemberId,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
}

/// One push request sent to the payment gateway for a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: PaymentAttemptId,
    /// Gateway-issued checkout reference. Unique across all attempts.
    pub checkout_request_id: String,
    pub receipt_id: ReceiptId,
    pub member_id: MemberId,
    pub amount: i64,
    pub phone: String,
    pub status: PaymentStatus,
    pub gateway_receipt_number: Option<String>,
    pub result_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentAttempt {
    pub checkout_request_id: String,
    pub receipt_id: ReceiptId,
    pub member_id: MemberId,
    pub amount: i64,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

/// Final outcome written onto a pending payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub status: PaymentStatus,
    pub gateway_receipt_number: Option<String>,
    pub result_description: Option<String>,
}
