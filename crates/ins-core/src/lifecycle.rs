//! Contract lifecycle: issuing, listing, signing and expiring contracts.
//!
//! Document rendering always happens before the database write it belongs
//! to. A staged document is committed only after the write succeeded, so a
//! failed render leaves no row behind and a lost signing race leaves the
//! winner's document untouched.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::access::{authorize, Action, Caller};
use crate::contract::{ClientSnapshot, Contract, ContractDraft, ContractView};
use crate::render::{document_name, Renderer, StagedDocument};
use crate::store::{AccountStore, ContractFilter, ContractStore, Signing};
use crate::uploads::{StoredUpload, Uploads};
use crate::{CoreError, CoreResult};

#[derive(Clone)]
pub struct ContractService {
    contracts: Arc<dyn ContractStore>,
    accounts: Arc<dyn AccountStore>,
    renderer: Arc<Renderer>,
    uploads: Uploads,
}

impl ContractService {
    pub fn new(
        contracts: Arc<dyn ContractStore>,
        accounts: Arc<dyn AccountStore>,
        renderer: Renderer,
        uploads: Uploads,
    ) -> Self {
        Self {
            contracts,
            accounts,
            renderer: Arc::new(renderer),
            uploads,
        }
    }

    /// Issue a new pending contract on behalf of the calling agent.
    pub async fn create(&self, caller: &Caller, draft: ContractDraft) -> CoreResult<Contract> {
        authorize(caller, Action::CreateContract)?;
        draft.validate()?;

        let mut contract = draft.into_contract(Uuid::new_v4(), caller.id, Utc::now())?;
        contract.pdf_url = Some(self.uploads.url_for(&document_name(contract.id)));

        let staged = self.render(contract.clone(), None).await?;
        self.contracts.insert_contract(&contract).await?;
        commit(staged, contract.id)?;

        info!(
            "Agent {} created {} contract {} ending {}",
            caller.id, contract.contract_type, contract.id, contract.end_date
        );
        Ok(contract)
    }

    pub async fn list_for_agent(&self, caller: &Caller) -> CoreResult<Vec<ContractView>> {
        authorize(caller, Action::ListAgentContracts)?;
        self.contracts
            .list_contracts(ContractFilter::IssuedBy(caller.id))
            .await
    }

    pub async fn list_for_client(&self, caller: &Caller) -> CoreResult<Vec<ContractView>> {
        authorize(caller, Action::ListClientContracts)?;
        self.contracts
            .list_contracts(ContractFilter::SignedBy(caller.id))
            .await
    }

    pub async fn list_all(&self, caller: &Caller) -> CoreResult<Vec<ContractView>> {
        authorize(caller, Action::ListAllContracts)?;
        self.contracts.list_contracts(ContractFilter::All).await
    }

    /// Contracts a client may still sign.
    pub async fn list_available(&self, caller: &Caller) -> CoreResult<Vec<ContractView>> {
        authorize(caller, Action::ListAvailableContracts)?;
        self.contracts
            .list_contracts(ContractFilter::Available(Utc::now()))
            .await
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> CoreResult<ContractView> {
        authorize(caller, Action::ViewContract)?;
        self.contracts
            .find_contract(id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Contract not found".to_string()))
    }

    /// Sign contract `id` as the calling client with an already stored
    /// signature image.
    ///
    /// Only one signer can win: the store applies the change only while the
    /// contract is still pending, and the loser gets a conflict.
    pub async fn sign(
        &self,
        caller: &Caller,
        id: Uuid,
        signature: &StoredUpload,
    ) -> CoreResult<Contract> {
        authorize(caller, Action::SignContract)?;

        let current = self
            .contracts
            .find_contract(id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Contract not found".to_string()))?
            .contract;
        let client = self
            .accounts
            .find_account(caller.id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Client not found".to_string()))?;

        let signing = Signing {
            client_id: client.id,
            snapshot: ClientSnapshot::from(&client),
            signature_url: signature.url.clone(),
            pdf_url: self.uploads.url_for(&document_name(id)),
            signed_at: Utc::now(),
        };

        // Rejects already signed or expired contracts before rendering.
        let mut preview = current;
        preview.sign(
            signing.client_id,
            signing.snapshot.clone(),
            signing.signature_url.clone(),
            signing.pdf_url.clone(),
            signing.signed_at,
        )?;

        let staged = self.render(preview, Some(signature.path.clone())).await?;

        let Some(signed) = self.contracts.sign_contract(id, &signing).await? else {
            warn!("Contract {} was signed concurrently; discarding render", id);
            return Err(CoreError::Conflict(
                "Contract is no longer available for signing".to_string(),
            ));
        };
        commit(staged, id)?;

        info!("Client {} signed contract {}", client.id, id);
        Ok(signed)
    }

    /// Expire every contract whose coverage ended at or before `now`.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let moved = self.contracts.expire_contracts(now).await?;
        if moved > 0 {
            info!("Expired {} contract(s)", moved);
        }
        Ok(moved)
    }

    async fn render(
        &self,
        contract: Contract,
        signature: Option<PathBuf>,
    ) -> CoreResult<StagedDocument> {
        let renderer = Arc::clone(&self.renderer);
        let id = contract.id;
        tokio::task::spawn_blocking(move || renderer.render(&contract, signature.as_deref()))
            .await
            .map_err(|e| CoreError::Render(format!("render task failed: {}", e)))?
            .map_err(|e| {
                error!("Rendering contract {} failed: {}", id, e);
                e
            })
    }
}

fn commit(staged: StagedDocument, id: Uuid) -> CoreResult<()> {
    staged.commit().map(|_| ()).map_err(|e| {
        error!("Contract {} saved but its document could not be moved into place: {}", id, e);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, NewAccount, Role};
    use crate::contract::ContractStatus;
    use crate::memory::MemoryStore;
    use crate::render::tests::write_png;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<MemoryStore>,
        service: ContractService,
        uploads: Uploads,
        agent: Caller,
        client: Caller,
    }

    async fn account(store: &MemoryStore, role: Role, n: u8) -> Caller {
        let account: Account = NewAccount {
            user_name: format!("user {}", n),
            email: format!("user{}@example.com", n),
            password: "secret123".to_string(),
            role: Some(role),
            cin: format!("1000000{}", n),
            adresse: "Tunis".to_string(),
            phone: format!("2000000{}", n),
        }
        .into_account(role, "hash".to_string(), None, Utc::now());
        store.insert_account(&account).await.unwrap();
        Caller::new(account.id, role)
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let uploads = Uploads::new(dir.path());
        let service = ContractService::new(
            store.clone(),
            store.clone(),
            Renderer::new(dir.path()),
            uploads.clone(),
        );
        let agent = account(&store, Role::Agent, 1).await;
        let client = account(&store, Role::Client, 2).await;
        Fixture {
            _dir: dir,
            store,
            service,
            uploads,
            agent,
            client,
        }
    }

    fn draft() -> ContractDraft {
        serde_json::from_value(serde_json::json!({
            "type": "AUTO",
            "description": "Assurance tous risques",
            "duration": "6_MONTHS",
            "prix": 450,
            "nameAgent": "Agent A",
            "emailAssurance": "agent@assurance.tn",
            "adresseAssurance": "Tunis"
        }))
        .unwrap()
    }

    async fn signature(uploads: &Uploads) -> StoredUpload {
        let stored = uploads.store("sig.png", b"").await.unwrap();
        write_png(&stored.path);
        stored
    }

    #[tokio::test]
    async fn test_create_renders_and_stores_pending_contract() {
        let f = fixture().await;
        let contract = f.service.create(&f.agent, draft()).await.unwrap();

        assert_eq!(contract.status, ContractStatus::Pending);
        assert_eq!(contract.agent_id, f.agent.id);
        assert_eq!(contract.price, Decimal::new(450, 0));
        assert_eq!(contract.price.to_string(), "450.00");
        assert!(contract.client_id.is_none());
        assert!(contract.client_snapshot().is_none());

        let url = contract.pdf_url.clone().unwrap();
        assert_eq!(url, format!("/uploads/contract-{}.pdf", contract.id));
        assert!(f.uploads.resolve(&url).unwrap().exists());

        let stored = f.service.get(&f.client, contract.id).await.unwrap();
        assert_eq!(stored.contract, contract);
        assert_eq!(stored.agent.unwrap().id, f.agent.id);
        assert!(stored.client.is_none());
    }

    #[tokio::test]
    async fn test_only_agents_create() {
        let f = fixture().await;
        let err = f.service.create(&f.client, draft()).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        assert!(f.store.list_contracts(ContractFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_snapshots_client() {
        let f = fixture().await;
        let contract = f.service.create(&f.agent, draft()).await.unwrap();
        let sig = signature(&f.uploads).await;

        let signed = f.service.sign(&f.client, contract.id, &sig).await.unwrap();
        let account = f.store.find_account(f.client.id).await.unwrap().unwrap();

        assert_eq!(signed.status, ContractStatus::Signed);
        assert_eq!(signed.client_id, Some(f.client.id));
        assert_eq!(signed.client_user_name.as_deref(), Some(account.user_name.as_str()));
        assert_eq!(signed.client_email.as_deref(), Some(account.email.as_str()));
        assert_eq!(signed.client_phone.as_deref(), Some(account.phone.as_str()));
        assert_eq!(signed.signature_url.as_deref(), Some(sig.url.as_str()));
        assert_eq!(signed.end_date, contract.end_date);

        let mine = f.service.list_for_client(&f.client).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].client.as_ref().unwrap().id, f.client.id);
    }

    #[tokio::test]
    async fn test_sign_missing_contract_is_not_found() {
        let f = fixture().await;
        let sig = signature(&f.uploads).await;
        let err = f.service.sign(&f.client, Uuid::new_v4(), &sig).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_second_sign_conflicts_and_keeps_first_signer() {
        let f = fixture().await;
        let other = account(&f.store, Role::Client, 3).await;
        let contract = f.service.create(&f.agent, draft()).await.unwrap();

        let sig = signature(&f.uploads).await;
        f.service.sign(&f.client, contract.id, &sig).await.unwrap();

        let err = f.service.sign(&other, contract.id, &sig).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let stored = f.service.get(&f.agent, contract.id).await.unwrap().contract;
        assert_eq!(stored.client_id, Some(f.client.id));
    }

    #[tokio::test]
    async fn test_concurrent_signers_have_one_winner() {
        let f = fixture().await;
        let other = account(&f.store, Role::Client, 3).await;
        let contract = f.service.create(&f.agent, draft()).await.unwrap();
        let sig_a = signature(&f.uploads).await;
        let sig_b = signature(&f.uploads).await;

        let (a, b) = tokio::join!(
            f.service.sign(&f.client, contract.id, &sig_a),
            f.service.sign(&other, contract.id, &sig_b)
        );
        let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(winners, 1);
        for result in [a, b] {
            if let Err(e) = result {
                assert!(matches!(e, CoreError::Conflict(_)));
            }
        }

        let stored = f.service.get(&f.agent, contract.id).await.unwrap().contract;
        assert_eq!(stored.status, ContractStatus::Signed);
    }

    #[tokio::test]
    async fn test_broken_signature_leaves_contract_pending() {
        let f = fixture().await;
        let contract = f.service.create(&f.agent, draft()).await.unwrap();
        let broken = f.uploads.store("sig.png", b"garbage").await.unwrap();

        let err = f.service.sign(&f.client, contract.id, &broken).await.unwrap_err();
        assert!(matches!(err, CoreError::Render(_)));

        let stored = f.service.get(&f.agent, contract.id).await.unwrap().contract;
        assert_eq!(stored, contract);
    }

    #[tokio::test]
    async fn test_listings_are_scoped() {
        let f = fixture().await;
        let first = f.service.create(&f.agent, draft()).await.unwrap();
        let second = f.service.create(&f.agent, draft()).await.unwrap();
        let sig = signature(&f.uploads).await;
        f.service.sign(&f.client, first.id, &sig).await.unwrap();

        let available = f.service.list_available(&f.client).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].contract.id, second.id);
        for view in &available {
            assert!(view.contract.client_id.is_none());
            assert_eq!(view.contract.status, ContractStatus::Pending);
        }

        let issued = f.service.list_for_agent(&f.agent).await.unwrap();
        assert_eq!(issued.len(), 2);
        assert!(issued[0].contract.created_at >= issued[1].contract.created_at);

        assert!(matches!(
            f.service.list_all(&f.client).await,
            Err(CoreError::Forbidden(_))
        ));
        assert_eq!(f.service.list_all(&f.agent).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_unstorable_prices() {
        let f = fixture().await;
        for prix in ["123.456", "100000000"] {
            let mut payload = draft();
            payload.price = prix.parse().unwrap();
            let err = f.service.create(&f.agent, payload).await.unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)), "{}", prix);
        }
        assert!(f.store.list_contracts(ContractFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lapsed_contract_is_closed_before_the_sweep() {
        let f = fixture().await;
        let issued = Utc::now() - chrono::Duration::days(400);
        let lapsed = draft()
            .into_contract(Uuid::new_v4(), f.agent.id, issued)
            .unwrap();
        f.store.insert_contract(&lapsed).await.unwrap();

        assert!(f.service.list_available(&f.client).await.unwrap().is_empty());

        let sig = signature(&f.uploads).await;
        let err = f.service.sign(&f.client, lapsed.id, &sig).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let stored = f.service.get(&f.agent, lapsed.id).await.unwrap().contract;
        assert_eq!(stored.status, ContractStatus::Pending);
        assert!(stored.client_id.is_none());
    }

    #[tokio::test]
    async fn test_expired_contract_cannot_be_signed() {
        let f = fixture().await;
        let contract = f.service.create(&f.agent, draft()).await.unwrap();

        let moved = f.service.expire_due(contract.end_date).await.unwrap();
        assert_eq!(moved, 1);
        assert!(f.service.list_available(&f.client).await.unwrap().is_empty());

        let sig = signature(&f.uploads).await;
        let err = f.service.sign(&f.client, contract.id, &sig).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(f.service.expire_due(contract.end_date).await.unwrap(), 0);
    }
}
