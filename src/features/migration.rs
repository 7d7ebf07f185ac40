//! Legacy format: one record per loan, each carrying its own list of repayments. Only ever read,
//! then flattened into per-party accounts.

use super::account::{party_key, Account, AccountId};
use super::transaction::{
    signed, Amount, Transaction, TransactionId, TransactionType, ValidationError,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Lending {
    #[serde(deserialize_with = "string_or_number")]
    id: String,

    party: String,

    /// Magnitude; older data may hold it as a string
    amount: Decimal,

    #[serde(rename = "type")]
    lending_type: TransactionType,

    date: NaiveDate,

    #[serde(default)]
    created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    payments: Vec<Payment>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(deserialize_with = "string_or_number")]
    id: String,

    amount: Decimal,

    date: NaiveDate,

    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Ids were millisecond timestamps, written as strings by some versions and numbers by others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}

/// Groups lendings by case-insensitive party, keeping the first-seen spelling and `createdAt`.
/// Each lending becomes a `lent`/`borrowed` entry with id `<lending id>_main`, followed by its
/// payments signed against it. Missing timestamps fall back to `now`.
pub fn migrate_lendings(
    lendings: Vec<Lending>,
    now: DateTime<Utc>,
) -> Result<Vec<Account>, ValidationError> {
    let mut accounts: Vec<Account> = Vec::new();
    let mut by_party: HashMap<String, usize> = HashMap::new();

    for lending in lendings {
        let party = lending.party.trim();
        if party.is_empty() {
            return Err(ValidationError::EmptyParty);
        }
        if lending.lending_type == TransactionType::Payment {
            return Err(ValidationError::NotALoan(lending.lending_type));
        }

        let created_at = lending.created_at.unwrap_or(now);
        let index = *by_party.entry(party_key(party)).or_insert_with(|| {
            accounts.push(Account::restore(
                AccountId::generate(),
                party,
                created_at,
                Vec::new(),
            ));
            accounts.len() - 1
        });

        let main_amount = signed(Amount::new(lending.amount.abs())?.value(), lending.lending_type);
        let mut transactions = vec![Transaction::restore(
            TransactionId::from(format!("{}_main", lending.id)),
            main_amount,
            lending.date,
            lending.lending_type,
            created_at,
        )];

        for payment in lending.payments {
            let magnitude = Amount::new(payment.amount.abs())?.value();
            let amount = if main_amount > Decimal::ZERO {
                -magnitude
            } else {
                magnitude
            };
            transactions.push(Transaction::restore(
                TransactionId::from(payment.id),
                amount,
                payment.date,
                TransactionType::Payment,
                payment.created_at.unwrap_or(now),
            ));
        }

        accounts[index].extend_history(transactions);
    }

    for account in &accounts {
        account.ensure_balance_in_range()?;
    }

    debug!("Migrated legacy lendings into {} accounts", accounts.len());
    Ok(accounts)
}
