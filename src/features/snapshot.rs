use super::account::{party_key, Account};
use super::migration::{migrate_lendings, Lending};
use super::store::{Store, StoreError};
use super::transaction::{Amount, TransactionType, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

pub const FORMAT_VERSION: &str = "2.0";

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Document is not valid - {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Document holds neither `accounts` nor `lendings`")]
    UnknownShape,

    #[error("Party {0} appears in more than one account")]
    DuplicateParty(String),

    #[error("Account id {0} appears more than once")]
    DuplicateAccount(String),

    #[error("Transaction id {transaction} appears more than once in account {account}")]
    DuplicateTransaction { account: String, transaction: String },

    #[error("Transaction {transaction} in account {account} is {kind} but its amount is {amount}")]
    WrongSign {
        account: String,
        transaction: String,
        kind: TransactionType,
        amount: String,
    },

    #[error("Entry is invalid - {0}")]
    Invalid(#[from] ValidationError),

    #[error("Unable to save the imported ledger - {0}")]
    Persistence(#[from] StoreError),
}

type ImportResult<T> = Result<T, ImportError>;

/// Full copy of the ledger, as exported and as kept on disk
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub accounts: Vec<Account>,
    pub export_date: DateTime<Utc>,
    pub version: String,
}

impl Snapshot {
    pub fn capture(accounts: &[Account]) -> Self {
        Self {
            accounts: accounts.to_vec(),
            export_date: Utc::now(),
            version: FORMAT_VERSION.to_string(),
        }
    }
}

/// Serializes the whole store as a pretty-printed v2 document.
pub fn export_snapshot(store: &Store) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&Snapshot::capture(store.list_accounts()))
}

/// Replaces the store wholesale with the document's accounts. Returns whether it succeeded; on
/// failure the store is untouched and the reason is logged.
pub fn import_snapshot(store: &mut Store, raw: &str) -> bool {
    match try_import_snapshot(store, raw) {
        Ok(count) => {
            info!("Imported {count} accounts");
            true
        }
        Err(e) => {
            warn!("Import rejected: {e}");
            false
        }
    }
}

pub fn try_import_snapshot(store: &mut Store, raw: &str) -> ImportResult<usize> {
    let Decoded { accounts, .. } = decode(raw)?;
    let count = accounts.len();

    store.mutate(move |current| -> ImportResult<()> {
        *current = accounts;
        Ok(())
    })?;
    Ok(count)
}

pub(crate) struct Decoded {
    pub accounts: Vec<Account>,

    /// The document was in the legacy lending format, so the accounts carry freshly generated ids
    pub migrated: bool,
}

/// Reads either a v2 document or a legacy `{ lendings }` document into accounts.
pub(crate) fn decode(raw: &str) -> ImportResult<Decoded> {
    let mut document: Value = serde_json::from_str(raw)?;

    if let Some(version) = document.get("version").and_then(Value::as_str) {
        if version != FORMAT_VERSION {
            warn!("Reading a version {version} document as version {FORMAT_VERSION}");
        }
    }

    if let Some(accounts) = document.get_mut("accounts").filter(|v| v.is_array()) {
        let accounts: Vec<Account> = serde_json::from_value(accounts.take())?;
        ensure_consistent(&accounts)?;
        return Ok(Decoded {
            accounts,
            migrated: false,
        });
    }

    if let Some(lendings) = document.get_mut("lendings").filter(|v| v.is_array()) {
        let lendings: Vec<Lending> = serde_json::from_value(lendings.take())?;
        info!("Migrating {} legacy lendings", lendings.len());
        return Ok(Decoded {
            accounts: migrate_lendings(lendings, Utc::now())?,
            migrated: true,
        });
    }

    Err(ImportError::UnknownShape)
}

/// One account per party and per id, and no blank parties. Within an account, transaction ids
/// are unique, amounts are in range and carry the sign their type implies.
fn ensure_consistent(accounts: &[Account]) -> ImportResult<()> {
    let mut parties = HashSet::new();
    let mut ids = HashSet::new();

    for account in accounts {
        if account.get_party().trim().is_empty() {
            return Err(ValidationError::EmptyParty.into());
        }
        if !parties.insert(party_key(account.get_party())) {
            return Err(ImportError::DuplicateParty(account.get_party().to_string()));
        }
        if !ids.insert(account.get_id().clone()) {
            return Err(ImportError::DuplicateAccount(account.get_id().to_string()));
        }
        ensure_transactions_consistent(account)?;
    }
    Ok(())
}

fn ensure_transactions_consistent(account: &Account) -> ImportResult<()> {
    let mut ids = HashSet::new();

    for transaction in account.get_transactions() {
        if !ids.insert(transaction.get_id()) {
            return Err(ImportError::DuplicateTransaction {
                account: account.get_id().to_string(),
                transaction: transaction.get_id().to_string(),
            });
        }

        let amount = transaction.get_amount();
        Amount::new(amount.abs())?;

        let sign_matches = match transaction.get_transaction_type() {
            TransactionType::Lent => amount.is_sign_positive(),
            TransactionType::Borrowed => amount.is_sign_negative(),
            TransactionType::Payment => true,
        };
        if !sign_matches {
            return Err(ImportError::WrongSign {
                account: account.get_id().to_string(),
                transaction: transaction.get_id().to_string(),
                kind: transaction.get_transaction_type(),
                amount: amount.to_string(),
            });
        }
    }

    account.ensure_balance_in_range()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::account::{Account, AccountId};
    use crate::features::transaction::{NewTransaction, TransactionType};
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn populated() -> Store {
        let mut store = Store::in_memory();
        for (party, amount, kind) in [
            ("Alice", "100", "lent"),
            ("Bob", "12.75", "borrowed"),
            ("alice", "0.10", "lent"),
        ] {
            let new = NewTransaction::parse(party, amount, kind, "2024-02-10").unwrap();
            Account::add_transaction(new, &mut store).unwrap();
        }
        let alice = store.find_by_party("Alice").unwrap().get_id().clone();
        let date = "2024-03-01".parse().unwrap();
        Account::add_payment(&alice, "40".parse().unwrap(), date, &mut store).unwrap();
        store
    }

    #[test]
    fn export_then_import_is_lossless() {
        let source = populated();
        let exported = export_snapshot(&source).unwrap();

        let mut target = Store::in_memory();
        assert!(import_snapshot(&mut target, &exported));

        assert_eq!(target.list_accounts(), source.list_accounts());
        assert_eq!(
            target.find_by_party("ALICE").unwrap().calculate_balance(),
            dec!(60.10)
        );
    }

    #[test]
    fn export_carries_date_and_version() {
        let exported = export_snapshot(&populated()).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&exported).unwrap();

        assert_eq!(snapshot.version, FORMAT_VERSION);
        assert_eq!(snapshot.accounts.len(), 2);
        assert!(snapshot.export_date <= Utc::now());
    }

    #[test]
    fn import_replaces_instead_of_merging() {
        let mut store = populated();
        let raw = r#"{"accounts":[{"id":"a1","party":"Dave","createdAt":"2024-01-01T00:00:00Z","transactions":[
            {"id":"t1","amount":15,"date":"2024-01-01","type":"lent","createdAt":"2024-01-01T00:00:00Z"}
        ]}],"exportDate":"2024-01-02T00:00:00Z","version":"2.0"}"#;

        assert!(import_snapshot(&mut store, raw));

        let accounts = store.list_accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].get_id(), &AccountId::from("a1"));
        assert_eq!(accounts[0].get_transactions()[0].get_id().to_string(), "t1");
        assert!(store.find_by_party("Alice").is_none());
    }

    #[test]
    fn import_accepts_accounts_without_export_metadata() {
        let mut store = Store::in_memory();
        assert!(import_snapshot(&mut store, r#"{"accounts":[]}"#));
        assert!(store.list_accounts().is_empty());
    }

    #[test_case(r#"{"something":"else"}"#; "neither accounts nor lendings")]
    #[test_case(r#"{"accounts":"nope"}"#; "accounts not a list")]
    #[test_case(r#"{"lendings":{}}"#; "lendings not a list")]
    #[test_case("{ not json"; "unparseable")]
    #[test_case("[]"; "bare list")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X"}]}"#; "account missing fields")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
        {"id":"t","amount":1,"date":"2024-02-30","type":"lent","createdAt":"2024-01-01T00:00:00Z"}]}]}"#; "impossible date")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
        {"id":"t","amount":1,"date":"2024-02-01","type":"gift","createdAt":"2024-01-01T00:00:00Z"}]}]}"#; "unknown type")]
    #[test_case(r#"{"accounts":[
        {"id":"a","party":"Eve","createdAt":"2024-01-01T00:00:00Z","transactions":[]},
        {"id":"b","party":"EVE","createdAt":"2024-01-01T00:00:00Z","transactions":[]}]}"#; "duplicate party")]
    #[test_case(r#"{"accounts":[
        {"id":"a","party":"Eve","createdAt":"2024-01-01T00:00:00Z","transactions":[]},
        {"id":"a","party":"Fay","createdAt":"2024-01-01T00:00:00Z","transactions":[]}]}"#; "duplicate id")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"  ","createdAt":"2024-01-01T00:00:00Z","transactions":[]}]}"#; "blank party")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
        {"id":"t","amount":1,"date":"2024-02-01","type":"lent","createdAt":"2024-01-01T00:00:00Z"},
        {"id":"t","amount":2,"date":"2024-02-02","type":"lent","createdAt":"2024-01-01T00:00:00Z"}]}]}"#; "duplicate transaction id")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
        {"id":"t","amount":-5,"date":"2024-02-01","type":"lent","createdAt":"2024-01-01T00:00:00Z"}]}]}"#; "negative lent")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
        {"id":"t","amount":5,"date":"2024-02-01","type":"borrowed","createdAt":"2024-01-01T00:00:00Z"}]}]}"#; "positive borrowed")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
        {"id":"t","amount":0,"date":"2024-02-01","type":"lent","createdAt":"2024-01-01T00:00:00Z"}]}]}"#; "zero amount")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
        {"id":"t","amount":1.005,"date":"2024-02-01","type":"lent","createdAt":"2024-01-01T00:00:00Z"}]}]}"#; "fraction of a cent")]
    #[test_case(r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
        {"id":"t1","amount":"79228162514264337593543950335","date":"2024-02-01","type":"lent","createdAt":"2024-01-01T00:00:00Z"},
        {"id":"t2","amount":"79228162514264337593543950335","date":"2024-02-02","type":"lent","createdAt":"2024-01-01T00:00:00Z"}]}]}"#; "amounts past the decimal range")]
    #[test_case(r#"{"lendings":[{"id":"1","party":"X","amount":"79228162514264337593543950335","type":"lent","date":"2024-02-01","payments":[]}]}"#; "legacy amount past the limit")]
    fn rejected_import_leaves_store_untouched(raw: &str) {
        let mut store = populated();
        let before = store.list_accounts().to_vec();

        assert!(!import_snapshot(&mut store, raw));
        assert_eq!(store.list_accounts(), before.as_slice());
    }

    #[test]
    fn import_reports_the_reason() {
        let mut store = Store::in_memory();
        assert!(matches!(
            try_import_snapshot(&mut store, r#"{"version":"2.0"}"#),
            Err(ImportError::UnknownShape)
        ));
        assert!(matches!(
            try_import_snapshot(&mut store, "nope"),
            Err(ImportError::Malformed(_))
        ));
    }

    #[test]
    fn import_names_the_offending_transaction() {
        let mut store = Store::in_memory();
        let raw = r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
            {"id":"t","amount":5,"date":"2024-02-01","type":"borrowed","createdAt":"2024-01-01T00:00:00Z"}]}]}"#;

        assert!(matches!(
            try_import_snapshot(&mut store, raw),
            Err(ImportError::WrongSign { transaction, kind: TransactionType::Borrowed, .. }) if transaction == "t"
        ));
    }

    #[test]
    fn payments_of_either_sign_are_imported() {
        let mut store = Store::in_memory();
        let raw = r#"{"accounts":[{"id":"a","party":"X","createdAt":"2024-01-01T00:00:00Z","transactions":[
            {"id":"t1","amount":10,"date":"2024-02-01","type":"lent","createdAt":"2024-01-01T00:00:00Z"},
            {"id":"t2","amount":-15,"date":"2024-02-02","type":"payment","createdAt":"2024-01-02T00:00:00Z"},
            {"id":"t3","amount":5,"date":"2024-02-03","type":"payment","createdAt":"2024-01-03T00:00:00Z"}]}]}"#;

        assert!(import_snapshot(&mut store, raw));
        assert_eq!(store.list_accounts()[0].calculate_balance(), dec!(0));
    }

    #[test]
    fn many_digit_amounts_survive_export_and_import() {
        let mut source = Store::in_memory();
        for (party, amount, kind) in [
            ("Alice", "123456789012.34", "lent"),
            ("Bob", "999999999999.99", "borrowed"),
            ("Carol", "0.07", "lent"),
        ] {
            let new = NewTransaction::parse(party, amount, kind, "2024-02-10").unwrap();
            Account::add_transaction(new, &mut source).unwrap();
        }

        let mut target = Store::in_memory();
        assert!(import_snapshot(&mut target, &export_snapshot(&source).unwrap()));

        assert_eq!(target.list_accounts(), source.list_accounts());
        assert_eq!(
            target.find_by_party("alice").unwrap().calculate_balance(),
            dec!(123456789012.34)
        );
        assert_eq!(
            target.find_by_party("bob").unwrap().calculate_balance(),
            dec!(-999999999999.99)
        );
    }

    #[test]
    fn import_accepts_legacy_lendings() {
        let mut store = populated();
        let raw = r#"{"lendings":[{
            "id":"1700000000000","party":"Alice","amount":50,"type":"lent","date":"2023-11-14",
            "createdAt":"2023-11-14T22:13:20.000Z",
            "payments":[{"id":"1700000500000","amount":20,"date":"2023-11-20","createdAt":"2023-11-20T08:00:00.000Z"}]
        }]}"#;

        assert!(import_snapshot(&mut store, raw));

        let accounts = store.list_accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].get_party(), "Alice");
        assert_eq!(accounts[0].get_transactions().len(), 2);
        assert_eq!(accounts[0].calculate_balance(), dec!(30));
        assert_eq!(
            accounts[0].get_transactions()[1].get_transaction_type(),
            TransactionType::Payment
        );
    }

    #[test]
    fn future_version_is_still_read() {
        let mut store = Store::in_memory();
        assert!(import_snapshot(
            &mut store,
            r#"{"accounts":[],"version":"3.0","exportDate":"2030-01-01T00:00:00Z"}"#
        ));
    }
}
