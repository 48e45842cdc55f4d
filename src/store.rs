//! Shared entity store with debounced JSON snapshot persistence.
//!
//! All data lives in memory behind one `RwLock`; a restart without a
//! snapshot file resets everything to the seeds. The snapshot writer runs
//! on a fixed interval and skips the write whenever the serialized state is
//! identical to the last one written, so a crash loses at most one interval
//! of changes.

use crate::entities::{Account, Admin, Branch, DepositType, StandingOrder, User};
use crate::model::{self, MockDefinition};
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

/// Next sequential collection id: `mock-0001`, `br-0004`, ...
/// Scans existing keys for the highest suffix rather than counting entries,
/// so an id is never reissued after a hard delete.
pub fn next_id<V>(map: &BTreeMap<String, V>, prefix: &str) -> String {
    let next = map
        .keys()
        .filter_map(|key| {
            key.strip_prefix(prefix)?
                .strip_prefix('-')?
                .parse::<u32>()
                .ok()
        })
        .max()
        .unwrap_or(0)
        + 1;
    format!("{prefix}-{next:04}")
}

/// The whole persisted dataset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DbState {
    #[serde(default)]
    pub branches: BTreeMap<String, Branch>,

    #[serde(default)]
    pub users: BTreeMap<String, User>,

    #[serde(default)]
    pub accounts: BTreeMap<String, Account>,

    #[serde(default)]
    pub deposit_types: BTreeMap<String, DepositType>,

    #[serde(default)]
    pub standing_orders: BTreeMap<String, StandingOrder>,

    #[serde(default)]
    pub admins: BTreeMap<String, Admin>,

    #[serde(default)]
    pub dynamic_mocks: BTreeMap<String, MockDefinition>,
}

impl DbState {
    /// Seed dataset used when the snapshot file is missing entries.
    pub fn seeded(admin: Admin) -> Self {
        let mut state = DbState::default();

        for (code, name, address, region, phone, email, manager) in [
            (
                "WL001",
                "Westlands Branch",
                "Westlands Road, Nairobi",
                "Nairobi",
                "+254711111001",
                "westlands@ncbabank.co.ke",
                "Peter Kamande",
            ),
            (
                "CBD002",
                "CBD Branch",
                "Kenyatta Avenue, Nairobi",
                "Nairobi",
                "+254711111002",
                "cbd@ncbabank.co.ke",
                "Mary Wanjiku",
            ),
            (
                "KSM003",
                "Kisumu Branch",
                "Oginga Odinga Street, Kisumu",
                "Nyanza",
                "+254711111003",
                "kisumu@ncbabank.co.ke",
                "John Otieno",
            ),
        ] {
            let id = next_id(&state.branches, "br");
            state.branches.insert(
                id.clone(),
                Branch {
                    id,
                    code: code.to_string(),
                    name: name.to_string(),
                    address: address.to_string(),
                    region: region.to_string(),
                    phone: Some(phone.to_string()),
                    email: Some(email.to_string()),
                    manager: Some(manager.to_string()),
                    status: "active".to_string(),
                    created_at: model::now(),
                    updated_at: None,
                },
            );
        }

        for (code, name, description, min_amount, min_term, max_term, base_rate, auto_renew) in [
            (
                "FD",
                "Fixed Deposit",
                "Standard fixed-term deposit with interest paid at maturity",
                10000.0,
                Some(30),
                Some(365),
                9.5,
                true,
            ),
            (
                "CD",
                "Call Deposit",
                "Flexible deposit with 7 days notice for withdrawal",
                50000.0,
                Some(7),
                None,
                6.0,
                false,
            ),
            (
                "HYFD",
                "High Yield FD",
                "Fixed deposit with monthly interest payment",
                100000.0,
                Some(90),
                Some(730),
                10.5,
                true,
            ),
        ] {
            let id = next_id(&state.deposit_types, "dt");
            state.deposit_types.insert(
                id.clone(),
                DepositType {
                    id,
                    code: code.to_string(),
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    currency: "KES".to_string(),
                    min_amount,
                    max_amount: None,
                    min_term_days: min_term,
                    max_term_days: max_term,
                    base_rate,
                    withholding_tax_rate: 15.0,
                    auto_renew_default: auto_renew,
                    status: "active".to_string(),
                    created_at: model::now(),
                    updated_at: None,
                },
            );
        }

        for (first, last, email, phone, id_number, dob, gender, address, branch, kra_pin) in [
            (
                "John",
                "Mwangi",
                "john.mwangi@email.com",
                "+254712345678",
                "12345678",
                "1985-06-15",
                "male",
                "P.O. Box 1234-00100, Nairobi",
                "br-0001",
                "A001234567B",
            ),
            (
                "Grace",
                "Achieng",
                "grace.achieng@email.com",
                "+254723456789",
                "23456789",
                "1990-03-22",
                "female",
                "P.O. Box 2345-00200, Nairobi",
                "br-0002",
                "A002345678C",
            ),
        ] {
            let id = next_id(&state.users, "usr");
            let seq = state.users.len() + 1;
            state.users.insert(
                id.clone(),
                User {
                    id,
                    customer_number: format!("CIF-{:06}", 1000 + seq),
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    email: email.to_string(),
                    phone: phone.to_string(),
                    id_type: "national_id".to_string(),
                    id_number: id_number.to_string(),
                    password: "Secure@1234".to_string(),
                    date_of_birth: Some(dob.to_string()),
                    gender: Some(gender.to_string()),
                    address: Some(address.to_string()),
                    branch_id: branch.to_string(),
                    kra_pin: Some(kra_pin.to_string()),
                    kyc_status: "verified".to_string(),
                    status: "active".to_string(),
                    created_at: model::now(),
                    updated_at: None,
                },
            );
        }

        let withdrawable = |number: &str, user: &str, branch: &str, subtype: &str, balance: f64, opened: &str| {
            Account {
                id: String::new(),
                account_number: number.to_string(),
                user_id: user.to_string(),
                branch_id: branch.to_string(),
                account_type: "withdrawable".to_string(),
                account_subtype: Some(subtype.to_string()),
                deposit_type_id: None,
                currency: "KES".to_string(),
                balance,
                principal: None,
                rate: None,
                term_days: None,
                value_date: None,
                maturity_date: None,
                status: "active".to_string(),
                opened_date: opened.to_string(),
                created_at: model::now(),
                updated_at: None,
            }
        };
        let seed_accounts = [
            withdrawable("1000000001", "usr-0001", "br-0001", "current", 458230.50, "2020-01-15"),
            withdrawable("1000000002", "usr-0001", "br-0001", "savings", 120000.00, "2020-01-15"),
            Account {
                id: String::new(),
                account_number: "2000000001".to_string(),
                user_id: "usr-0001".to_string(),
                branch_id: "br-0001".to_string(),
                account_type: "deposit".to_string(),
                account_subtype: None,
                deposit_type_id: Some("dt-0001".to_string()),
                currency: "KES".to_string(),
                balance: 500000.0,
                principal: Some(500000.0),
                rate: Some(9.5),
                term_days: Some(90),
                value_date: Some("2026-01-01".to_string()),
                maturity_date: Some("2026-04-01".to_string()),
                status: "active".to_string(),
                opened_date: "2026-01-01".to_string(),
                created_at: model::now(),
                updated_at: None,
            },
            withdrawable("1000000003", "usr-0002", "br-0002", "current", 95000.00, "2021-06-10"),
        ];
        for mut account in seed_accounts {
            let id = next_id(&state.accounts, "acc");
            account.id = id.clone();
            state.accounts.insert(id, account);
        }

        state.admins.insert(admin.id.clone(), admin);
        state
    }

    /// Merge a loaded snapshot over the seeds, entry by entry. Snapshot
    /// entries win; seeded entries absent from the snapshot survive.
    fn merge(&mut self, loaded: DbState) {
        self.branches.extend(loaded.branches);
        self.users.extend(loaded.users);
        self.accounts.extend(loaded.accounts);
        self.deposit_types.extend(loaded.deposit_types);
        self.standing_orders.extend(loaded.standing_orders);
        self.admins.extend(loaded.admins);
        self.dynamic_mocks.extend(loaded.dynamic_mocks);
    }
}

/// Process-wide store shared by every handler.
pub struct Store {
    state: RwLock<DbState>,
    /// Snapshot file; `None` keeps the store memory-only.
    path: Option<PathBuf>,
    /// Serialized form of the last snapshot actually written.
    last_written: Mutex<String>,
}

impl Store {
    /// Build the store from seeds, merging an existing snapshot file over
    /// them when one is present. An unreadable snapshot logs an error and
    /// falls back to the seeds alone.
    pub fn open(path: Option<PathBuf>, mut seeds: DbState) -> Self {
        if let Some(file) = path.as_deref().filter(|p| p.exists()) {
            match std::fs::read_to_string(file)
                .map_err(anyhow::Error::from)
                .and_then(|text| {
                    serde_json::from_str::<DbState>(&text).context("parsing snapshot")
                }) {
                Ok(loaded) => {
                    info!(path = %file.display(), "loaded snapshot");
                    seeds.merge(loaded);
                }
                Err(err) => {
                    error!(path = %file.display(), error = %err, "snapshot unreadable, using seeds");
                }
            }
        }

        Self {
            state: RwLock::new(seeds),
            path,
            last_written: Mutex::new(String::new()),
        }
    }

    /// Memory-only store, used by tests.
    pub fn in_memory(seeds: DbState) -> Self {
        Self::open(None, seeds)
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, DbState> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, DbState> {
        self.state.write().await
    }

    /// Write a snapshot if the state changed since the last write.
    /// Returns whether a write happened. Best effort: callers log failures
    /// and carry on.
    pub async fn save(&self) -> anyhow::Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let serialized = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)?
        };

        let mut last_written = self.last_written.lock().await;
        if *last_written == serialized {
            return Ok(false);
        }

        tokio::fs::write(path, &serialized)
            .await
            .with_context(|| format!("writing snapshot to {}", path.display()))?;
        *last_written = serialized;
        debug!(path = %path.display(), "snapshot written");
        Ok(true)
    }

    /// Fixed-interval snapshot loop. Runs until the process exits.
    pub async fn run_snapshot_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.save().await {
                error!(error = %err, "snapshot failed");
            }
        }
    }
}
