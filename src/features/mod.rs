mod account;
mod batch;
mod migration;
mod snapshot;
mod store;
mod transaction;

pub use self::{
    account::{Account, AccountError, AccountId, Standing},
    batch::record_csv,
    snapshot::{export_snapshot, import_snapshot},
    store::Store,
    transaction::{
        parse_date, Amount, NewTransaction, Transaction, TransactionId, TransactionType,
        ValidationError,
    },
};
