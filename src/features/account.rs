use super::store::{Store, StoreError};
use super::transaction::{
    Amount, NewTransaction, Transaction, TransactionId, TransactionType, ValidationError,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Account {0} does not exist")]
    NotFound(AccountId),

    #[error("Invalid input - {0}")]
    Invalid(#[from] ValidationError),

    #[error("Unable to save the ledger - {0}")]
    Persistence(#[from] StoreError),
}

type AccountResult<T> = Result<T, AccountError>;

/// Which way the debt with a counterparty currently points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// The counterparty owes the owner
    Owed,
    /// The owner owes the counterparty
    Owing,
    Settled,
}

/// Running ledger with one counterparty
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    id: AccountId,

    /// Display name as first entered. Lookups ignore case.
    party: String,

    /// Entry order, which is not necessarily `date` order
    transactions: Vec<Transaction>,

    created_at: DateTime<Utc>,
}

impl Account {
    pub(crate) fn new(party: &str, created_at: DateTime<Utc>) -> Self {
        Self::restore(AccountId::generate(), party, created_at, Vec::new())
    }

    pub(crate) fn restore(
        id: AccountId,
        party: &str,
        created_at: DateTime<Utc>,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            id,
            party: party.to_string(),
            transactions,
            created_at,
        }
    }

    /// Get the account's id.
    pub fn get_id(&self) -> &AccountId {
        &self.id
    }

    /// Get the account's party, as first entered.
    pub fn get_party(&self) -> &str {
        &self.party
    }

    /// Get the account's transactions in entry order.
    pub fn get_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Get the account's creation time.
    pub fn get_created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn matches_party(&self, party: &str) -> bool {
        party_key(&self.party) == party_key(party)
    }

    /// Sum of every signed amount. Never persisted. Saturates at the bounds of `Decimal`, which
    /// an account only reaches if it was loaded past [`Account::ensure_balance_in_range`].
    pub fn calculate_balance(&self) -> Decimal {
        self.transactions
            .iter()
            .fold(Decimal::ZERO, |sum, t| sum.saturating_add(t.get_amount()))
    }

    /// Sum of every signed amount, or `None` once it leaves the range of `Decimal`.
    pub fn checked_balance(&self) -> Option<Decimal> {
        self.transactions
            .iter()
            .try_fold(Decimal::ZERO, |sum, t| sum.checked_add(t.get_amount()))
    }

    pub(crate) fn ensure_balance_in_range(&self) -> Result<(), ValidationError> {
        match self.checked_balance() {
            Some(_) => Ok(()),
            None => Err(ValidationError::BalanceOutOfRange(self.id.clone())),
        }
    }

    pub fn standing(&self) -> Standing {
        let balance = self.calculate_balance();
        if balance > Decimal::ZERO {
            Standing::Owed
        } else if balance < Decimal::ZERO {
            Standing::Owing
        } else {
            Standing::Settled
        }
    }

    /// Most recently entered transaction, regardless of its `date`.
    pub fn last_transaction(&self) -> Option<&Transaction> {
        self.transactions.last()
    }

    /// Transactions newest entry first.
    pub fn history(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().rev()
    }

    pub(crate) fn find_or_create_by_party<'a>(
        party: &str,
        accounts: &'a mut Vec<Account>,
        now: DateTime<Utc>,
    ) -> &'a mut Account {
        let index = match accounts.iter().position(|a| a.matches_party(party)) {
            Some(index) => index,
            None => {
                debug!("Opening an account for {party}");
                accounts.push(Account::new(party, now));
                accounts.len() - 1
            }
        };
        &mut accounts[index]
    }

    pub fn add_transaction(new: NewTransaction, store: &mut Store) -> AccountResult<Transaction> {
        let now = Utc::now();
        let amount = new.signed_amount();

        let transaction = store.mutate(|accounts| -> AccountResult<Transaction> {
            let account = Self::find_or_create_by_party(&new.party, accounts, now);
            let transaction = account.push(amount, new.date, new.transaction_type, now);
            account.ensure_balance_in_range()?;
            Ok(transaction)
        })?;

        info!(
            "Recorded {} of {} with {}",
            new.transaction_type, amount, new.party
        );
        Ok(transaction)
    }

    /// Records a repayment that moves the balance towards zero. Paying more than is owed is
    /// accepted and flips the direction of the debt.
    pub fn add_payment(
        account_id: &AccountId,
        amount: Amount,
        date: NaiveDate,
        store: &mut Store,
    ) -> AccountResult<Transaction> {
        let now = Utc::now();

        let transaction = store.mutate(|accounts| -> AccountResult<Transaction> {
            let account = accounts
                .iter_mut()
                .find(|a| &a.id == account_id)
                .ok_or_else(|| AccountError::NotFound(account_id.clone()))?;

            let signed_amount = match account.standing() {
                Standing::Owed => -amount.value(),
                Standing::Owing => amount.value(),
                Standing::Settled => {
                    return Err(ValidationError::NothingOwed(account_id.clone()).into())
                }
            };

            let transaction = account.push(signed_amount, date, TransactionType::Payment, now);
            account.ensure_balance_in_range()?;
            Ok(transaction)
        })?;

        info!(
            "Recorded payment of {} on account {account_id}",
            transaction.get_amount()
        );
        Ok(transaction)
    }

    /// Removes the account with its whole history. Unknown ids are a no-op.
    pub fn delete(account_id: &AccountId, store: &mut Store) -> AccountResult<bool> {
        if store.find(account_id).is_none() {
            debug!("Account {account_id} already absent, nothing to delete");
            return Ok(false);
        }

        store.mutate(|accounts| -> AccountResult<()> {
            accounts.retain(|a| &a.id != account_id);
            Ok(())
        })?;

        info!("Deleted account {account_id}");
        Ok(true)
    }

    /// Removes one transaction. Unknown account or transaction ids are a no-op. The account is
    /// kept even once its history is empty.
    pub fn delete_transaction(
        account_id: &AccountId,
        transaction_id: &TransactionId,
        store: &mut Store,
    ) -> AccountResult<bool> {
        let exists = store
            .find(account_id)
            .map_or(false, |a| a.transactions.iter().any(|t| t.get_id() == transaction_id));
        if !exists {
            debug!("Transaction {transaction_id} not in account {account_id}, nothing to delete");
            return Ok(false);
        }

        store.mutate(|accounts| -> AccountResult<()> {
            if let Some(account) = accounts.iter_mut().find(|a| &a.id == account_id) {
                account.transactions.retain(|t| t.get_id() != transaction_id);
            }
            Ok(())
        })?;

        info!("Deleted transaction {transaction_id} from account {account_id}");
        Ok(true)
    }

    pub(crate) fn extend_history(&mut self, transactions: impl IntoIterator<Item = Transaction>) {
        self.transactions.extend(transactions);
    }

    fn push(
        &mut self,
        amount: Decimal,
        date: NaiveDate,
        transaction_type: TransactionType,
        now: DateTime<Utc>,
    ) -> Transaction {
        let created_at = self.next_created_at(now);
        let transaction = Transaction::new(amount, date, transaction_type, created_at);
        self.transactions.push(transaction.clone());
        transaction
    }

    /// `createdAt` strictly increases within an account even if the clock does not.
    fn next_created_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.transactions.iter().map(Transaction::get_created_at).max() {
            Some(latest) if latest >= now => latest + Duration::microseconds(1),
            _ => now,
        }
    }
}

pub(crate) fn party_key(party: &str) -> String {
    party.trim().to_lowercase()
}
