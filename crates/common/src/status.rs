//! Lifecycle states of loans, receipts and payment attempts.

use serde::{Deserialize, Serialize};

/// The state of a borrowed copy.
///
/// State transitions:
/// ```text
/// Active ──► Returned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoanStatus {
    /// The copy is out with the member.
    #[default]
    Active,

    /// The copy is back on the shelf (terminal state).
    Returned,
}

impl LoanStatus {
    /// Returns true if the loan can be returned.
    pub fn can_return(&self) -> bool {
        matches!(self, LoanStatus::Active)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "Active",
            LoanStatus::Returned => "Returned",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(LoanStatus::Active),
            "Returned" => Ok(LoanStatus::Returned),
            other => Err(format!("unknown loan status: {other}")),
        }
    }
}

/// The payment state of a receipt.
///
/// State transitions:
/// ```text
/// Unpaid ──► Paid
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReceiptStatus {
    /// Created by a purchase, awaiting a successful payment.
    #[default]
    Unpaid,

    /// A payment attempt succeeded (terminal state).
    Paid,
}

impl ReceiptStatus {
    /// Returns true if a payment may still be requested for the receipt.
    pub fn can_pay(&self) -> bool {
        matches!(self, ReceiptStatus::Unpaid)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Unpaid => "Unpaid",
            ReceiptStatus::Paid => "Paid",
        }
    }
}

impl std::fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReceiptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unpaid" => Ok(ReceiptStatus::Unpaid),
            "Paid" => Ok(ReceiptStatus::Paid),
            other => Err(format!("unknown receipt status: {other}")),
        }
    }
}

/// The state of a single push request sent to the gateway.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Succeeded
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Push sent, no callback processed yet.
    #[default]
    Pending,

    /// The payer declined, timed out or the gateway rejected the debit (terminal state).
    Failed,

    /// The gateway confirmed the debit (terminal state).
    Succeeded,
}

impl PaymentStatus {
    /// Returns true if a callback may still settle this attempt.
    pub fn can_settle(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Succeeded)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Succeeded => "Succeeded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Failed" => Ok(PaymentStatus::Failed),
            "Succeeded" => Ok(PaymentStatus::Succeeded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}
