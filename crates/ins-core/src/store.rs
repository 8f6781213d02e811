//! Storage seams. The server injects a database-backed implementation; tests
//! and tools use [`crate::MemoryStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::account::Account;
use crate::contract::{ClientSnapshot, Contract, ContractView};
use crate::CoreResult;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. Duplicate email or national ID is a validation
    /// error.
    async fn insert_account(&self, account: &Account) -> CoreResult<()>;

    async fn find_account(&self, id: Uuid) -> CoreResult<Option<Account>>;

    async fn find_account_by_email(&self, email: &str) -> CoreResult<Option<Account>>;

    async fn find_account_by_cin(&self, cin: &str) -> CoreResult<Option<Account>>;

    /// Overwrite every mutable column of an existing account.
    async fn update_account(&self, account: &Account) -> CoreResult<()>;

    /// Returns `false` when no such account existed.
    async fn delete_account(&self, id: Uuid) -> CoreResult<bool>;

    async fn list_accounts(&self) -> CoreResult<Vec<Account>>;
}

/// Which contracts a listing returns. Every listing is newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractFilter {
    IssuedBy(Uuid),
    SignedBy(Uuid),
    All,
    /// Unsigned, still pending contracts whose coverage has not ended at
    /// the given instant.
    Available(DateTime<Utc>),
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        use crate::contract::ContractStatus;
        match self {
            ContractFilter::IssuedBy(agent) => contract.agent_id == *agent,
            ContractFilter::SignedBy(client) => contract.client_id == Some(*client),
            ContractFilter::All => true,
            ContractFilter::Available(now) => {
                contract.client_id.is_none()
                    && contract.status == ContractStatus::Pending
                    && contract.end_date > *now
            }
        }
    }
}

/// Field changes written by a signing, applied in one conditional update.
#[derive(Debug, Clone)]
pub struct Signing {
    pub client_id: Uuid,
    pub snapshot: ClientSnapshot,
    pub signature_url: String,
    pub pdf_url: String,
    pub signed_at: DateTime<Utc>,
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Insert a fully formed contract, document reference included.
    async fn insert_contract(&self, contract: &Contract) -> CoreResult<()>;

    async fn find_contract(&self, id: Uuid) -> CoreResult<Option<ContractView>>;

    async fn list_contracts(&self, filter: ContractFilter) -> CoreResult<Vec<ContractView>>;

    /// Apply `signing` only if the contract is still `PENDING`. Returns the
    /// updated contract, or `None` when the contract is missing or no longer
    /// pending.
    async fn sign_contract(&self, id: Uuid, signing: &Signing) -> CoreResult<Option<Contract>>;

    /// Move every pending or signed contract whose end date is at or before
    /// `now` to `EXPIRED`. Returns how many moved.
    async fn expire_contracts(&self, now: DateTime<Utc>) -> CoreResult<u64>;
}
