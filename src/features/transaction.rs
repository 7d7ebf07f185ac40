use super::account::AccountId;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{ser, Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money handed to the counterparty. Stored as a positive amount, it increases what they owe.
    Lent,

    /// Money received from the counterparty. Stored as a negative amount, it increases what
    /// the owner owes them.
    Borrowed,

    /// A repayment in either direction. It carries whichever sign shrinks the outstanding balance
    /// at the time it is recorded.
    Payment,
}

impl TransactionType {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Lent => "lent",
            TransactionType::Borrowed => "borrowed",
            TransactionType::Payment => "payment",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lent" => Ok(TransactionType::Lent),
            "borrowed" => Ok(TransactionType::Borrowed),
            "payment" => Ok(TransactionType::Payment),
            _ => Err(ValidationError::UnknownType(s.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Party name cannot be empty")]
    EmptyParty,

    #[error("Invalid amount - {0}. Expected a positive number up to 999999999999.99 with at most 2 decimals")]
    InvalidAmount(String),

    #[error("Invalid date - {0}. Expected a calendar date as YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Unknown transaction type - {0}")]
    UnknownType(String),

    #[error("A {0} cannot open a debt, only lent or borrowed can")]
    NotALoan(TransactionType),

    #[error("Account {0} is settled, there is no debt to pay")]
    NothingOwed(AccountId),

    #[error("Balance of account {0} would exceed the supported range")]
    BalanceOutOfRange(AccountId),
}

type ValidationResult<T> = Result<T, ValidationError>;

/// Largest magnitude a single entry may carry. Fifteen significant digits, so every amount
/// survives the trip through a JSON number unchanged.
pub const MAX_AMOUNT: Decimal = dec!(999999999999.99);

/// Cents
pub const AMOUNT_SCALE: u32 = 2;

/// Unsigned magnitude of a monetary entry. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> ValidationResult<Self> {
        let value = value.normalize();
        if value <= Decimal::ZERO || value > MAX_AMOUNT || value.scale() > AMOUNT_SCALE {
            return Err(ValidationError::InvalidAmount(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| ValidationError::InvalidAmount(s.to_string()))?;
        Self::new(value)
    }
}

pub fn parse_date(s: &str) -> ValidationResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

/// A validated request to record a loan or a borrowing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub(crate) party: String,
    pub(crate) amount: Amount,
    pub(crate) transaction_type: TransactionType,
    pub(crate) date: NaiveDate,
}

impl NewTransaction {
    pub fn new(
        party: &str,
        amount: Amount,
        transaction_type: TransactionType,
        date: NaiveDate,
    ) -> ValidationResult<Self> {
        let party = party.trim();
        if party.is_empty() {
            return Err(ValidationError::EmptyParty);
        }
        if transaction_type == TransactionType::Payment {
            return Err(ValidationError::NotALoan(transaction_type));
        }

        Ok(Self {
            party: party.to_string(),
            amount,
            transaction_type,
            date,
        })
    }

    /// Parses raw user input. Nothing past this point re-parses amounts, dates or types.
    pub fn parse(
        party: &str,
        amount: &str,
        transaction_type: &str,
        date: &str,
    ) -> ValidationResult<Self> {
        Self::new(
            party,
            amount.parse()?,
            transaction_type.parse()?,
            parse_date(date)?,
        )
    }

    pub(crate) fn signed_amount(&self) -> Decimal {
        signed(self.amount.value(), self.transaction_type)
    }
}

/// `lent` is stored positive and `borrowed` negative, whatever sign the magnitude came with.
pub(crate) fn signed(magnitude: Decimal, transaction_type: TransactionType) -> Decimal {
    match transaction_type {
        TransactionType::Borrowed => -magnitude.abs(),
        _ => magnitude.abs(),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique within its account
    id: TransactionId,

    /// Positive increases what the counterparty owes, negative decreases it
    #[serde(serialize_with = "amount_serialize")]
    amount: Decimal,

    /// Only displayed, never used for ordering
    date: NaiveDate,

    #[serde(rename = "type")]
    transaction_type: TransactionType,

    created_at: DateTime<Utc>,
}

fn amount_serialize<S>(amount: &Decimal, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    // Nearest f64 to the decimal text. Within MAX_AMOUNT and AMOUNT_SCALE it prints back
    // as the same digits.
    let value = f64::from_str(&amount.to_string()).map_err(ser::Error::custom)?;
    s.serialize_f64(value)
}

impl Transaction {
    pub(crate) fn new(
        amount: Decimal,
        date: NaiveDate,
        transaction_type: TransactionType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::restore(
            TransactionId::generate(),
            amount,
            date,
            transaction_type,
            created_at,
        )
    }

    pub(crate) fn restore(
        id: TransactionId,
        amount: Decimal,
        date: NaiveDate,
        transaction_type: TransactionType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            amount,
            date,
            transaction_type,
            created_at,
        }
    }

    /// Get the transaction's id.
    pub fn get_id(&self) -> &TransactionId {
        &self.id
    }

    /// Get the transaction's signed amount.
    pub fn get_amount(&self) -> Decimal {
        self.amount
    }

    /// Get the transaction's date.
    pub fn get_date(&self) -> NaiveDate {
        self.date
    }

    /// Get the transaction's type.
    pub fn get_transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    /// Get the transaction's creation time.
    pub fn get_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
