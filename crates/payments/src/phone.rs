use domain::DomainError;
use serde::Serialize;

/// A payer's phone number in international format without the plus sign,
/// e.g. `254708374149`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Validates a phone number. A leading `+` is accepted and dropped.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let digits = raw.trim().trim_start_matches('+');
        if !(9..=15).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "invalid phone number: {raw}"
            )));
        }
        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
