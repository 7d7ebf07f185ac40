use super::account::{Account, AccountError};
use super::store::Store;
use super::transaction::NewTransaction;
use serde::Deserialize;
use std::io;

/// One CSV row, kept as raw text so every field goes through the same validation as typed input
#[derive(Deserialize, Debug)]
struct TransactionRecord {
    party: String,
    amount: String,
    #[serde(rename = "type")]
    transaction_type: String,
    date: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub recorded: usize,
    pub skipped: usize,
}

/// Records every `party, amount, type, date` row of `reader`. Rows that fail to parse or validate
/// are logged and skipped. A failure to persist stops the batch.
pub fn record_csv<R: io::Read>(reader: R, store: &mut Store) -> Result<BatchSummary, AccountError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut summary = BatchSummary::default();

    for (row, result) in rdr.deserialize::<TransactionRecord>().enumerate() {
        let line = row + 2;
        let new = match result {
            Ok(record) => NewTransaction::parse(
                &record.party,
                &record.amount,
                &record.transaction_type,
                &record.date,
            ),
            Err(e) => {
                warn!("Row {line}: {e}");
                summary.skipped += 1;
                continue;
            }
        };

        match new.map_err(AccountError::from).and_then(|new| Account::add_transaction(new, store)) {
            Ok(_) => summary.recorded += 1,
            Err(e @ AccountError::Persistence(_)) => return Err(e),
            Err(e) => {
                warn!("Row {line}: {e}");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}
