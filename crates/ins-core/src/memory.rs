//! In-process store backing tests and offline tools.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::account::Account;
use crate::contract::{Contract, ContractStatus, ContractView};
use crate::store::{AccountStore, ContractFilter, ContractStore, Signing};
use crate::{CoreError, CoreResult};

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    contracts: HashMap<Uuid, Contract>,
}

impl State {
    fn view(&self, contract: &Contract) -> ContractView {
        ContractView {
            contract: contract.clone(),
            agent: self
                .accounts
                .get(&contract.agent_id)
                .map(Account::public_identity),
            client: contract
                .client_id
                .and_then(|id| self.accounts.get(&id))
                .map(Account::public_identity),
        }
    }

    fn check_unique(&self, account: &Account) -> CoreResult<()> {
        for other in self.accounts.values().filter(|a| a.id != account.id) {
            if other.email == account.email {
                return Err(CoreError::Validation("User already exists".to_string()));
            }
            if other.cin == account.cin {
                return Err(CoreError::Validation("CIN already exists".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> CoreResult<()> {
        let mut state = self.state.write().await;
        state.check_unique(account)?;
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account(&self, id: Uuid) -> CoreResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> CoreResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account_by_cin(&self, cin: &str) -> CoreResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.values().find(|a| a.cin == cin).cloned())
    }

    async fn update_account(&self, account: &Account) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&account.id) {
            return Err(CoreError::NotFound("User not found".to_string()));
        }
        state.check_unique(account)?;
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn delete_account(&self, id: Uuid) -> CoreResult<bool> {
        let mut state = self.state.write().await;
        let referenced = state
            .contracts
            .values()
            .any(|c| c.agent_id == id || c.client_id == Some(id));
        if referenced {
            return Err(CoreError::Conflict("User still has contracts".to_string()));
        }
        Ok(state.accounts.remove(&id).is_some())
    }

    async fn list_accounts(&self) -> CoreResult<Vec<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(accounts)
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn insert_contract(&self, contract: &Contract) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&contract.agent_id) {
            return Err(CoreError::Storage(format!(
                "agent {} does not exist",
                contract.agent_id
            )));
        }
        state.contracts.insert(contract.id, contract.clone());
        Ok(())
    }

    async fn find_contract(&self, id: Uuid) -> CoreResult<Option<ContractView>> {
        let state = self.state.read().await;
        Ok(state.contracts.get(&id).map(|c| state.view(c)))
    }

    async fn list_contracts(&self, filter: ContractFilter) -> CoreResult<Vec<ContractView>> {
        let state = self.state.read().await;
        let mut contracts: Vec<&Contract> = state
            .contracts
            .values()
            .filter(|c| filter.matches(c))
            .collect();
        contracts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(contracts.into_iter().map(|c| state.view(c)).collect())
    }

    async fn sign_contract(&self, id: Uuid, signing: &Signing) -> CoreResult<Option<Contract>> {
        let mut state = self.state.write().await;
        let Some(contract) = state.contracts.get_mut(&id) else {
            return Ok(None);
        };
        if contract.status != ContractStatus::Pending {
            return Ok(None);
        }
        contract.sign(
            signing.client_id,
            signing.snapshot.clone(),
            signing.signature_url.clone(),
            signing.pdf_url.clone(),
            signing.signed_at,
        )?;
        Ok(Some(contract.clone()))
    }

    async fn expire_contracts(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let mut state = self.state.write().await;
        let mut moved = 0;
        for contract in state.contracts.values_mut() {
            if contract.is_due_for_expiry(now) {
                contract.status = ContractStatus::Expired;
                contract.updated_at = now;
                moved += 1;
            }
        }
        Ok(moved)
    }
}
