use super::account::{party_key, Account, AccountId};
use super::snapshot::{self, Decoded, Snapshot};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unable to access the ledger file - {0}")]
    Io(#[from] io::Error),

    #[error("Unable to encode the ledger - {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Ledger file {} cannot be read - {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
}

#[derive(Debug)]
enum Medium {
    Memory,
    File(PathBuf),
}

/// This keeps every account of the ledger and writes them back to the medium after each change
#[derive(Debug)]
pub struct Store {
    accounts: Vec<Account>,
    medium: Medium,
}

impl Store {
    /// A store that lives only as long as the value does.
    pub fn in_memory() -> Self {
        Self {
            accounts: Vec::new(),
            medium: Medium::Memory,
        }
    }

    /// Loads the ledger file at `path`. A missing file is an empty ledger; a file in the legacy
    /// lending format is migrated and written back straight away, so the generated account ids
    /// stay the same on every later open.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let Decoded { accounts, migrated } = match fs::read_to_string(&path) {
            Ok(raw) => snapshot::decode(&raw).map_err(|e| StoreError::Unreadable {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No ledger at {}, starting empty", path.display());
                Decoded {
                    accounts: Vec::new(),
                    migrated: false,
                }
            }
            Err(e) => return Err(e.into()),
        };

        debug!("Loaded {} accounts from {}", accounts.len(), path.display());
        let store = Self {
            accounts,
            medium: Medium::File(path),
        };
        if migrated {
            store.persist()?;
            info!("Rewrote the legacy ledger in the current format");
        }
        Ok(store)
    }

    /// Every account in creation order.
    pub fn list_accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn find(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.get_id() == id)
    }

    pub fn find_by_party(&self, party: &str) -> Option<&Account> {
        let key = party_key(party);
        self.accounts.iter().find(|a| party_key(a.get_party()) == key)
    }

    /// Applies one change and persists the result. If the change or the write fails, the
    /// accounts are left exactly as they were.
    pub(crate) fn mutate<T, E, F>(&mut self, change: F) -> Result<T, E>
    where
        F: FnOnce(&mut Vec<Account>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let previous = self.accounts.clone();
        let outcome = change(&mut self.accounts).and_then(|value| {
            self.persist()?;
            Ok(value)
        });

        if outcome.is_err() {
            self.accounts = previous;
        }
        outcome
    }

    fn persist(&self) -> Result<(), StoreError> {
        let path = match &self.medium {
            Medium::Memory => return Ok(()),
            Medium::File(path) => path,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&Snapshot::capture(&self.accounts))?;
        let staging = path.with_extension("tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, path)?;

        trace!("Wrote {} accounts to {}", self.accounts.len(), path.display());
        Ok(())
    }
}
