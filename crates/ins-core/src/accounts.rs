//! Account management: registration, login, admin maintenance and profile
//! updates.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::access::{authorize, Action, Caller};
use crate::account::{Account, AccountPatch, NewAccount, Role};
use crate::password::{hash_password, verify_password};
use crate::store::AccountStore;
use crate::uploads::{StoredUpload, Uploads};
use crate::{CoreError, CoreResult};

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    uploads: Uploads,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountStore>, uploads: Uploads) -> Self {
        Self { accounts, uploads }
    }

    /// Self-service registration. The role defaults to `client`; `admin`
    /// cannot be chosen.
    pub async fn register(&self, payload: NewAccount) -> CoreResult<Account> {
        payload.validate()?;
        let role = payload.role.unwrap_or_default();
        if !role.self_registrable() {
            return Err(CoreError::Validation(format!("Invalid role: {}", role)));
        }

        let account = self.create(payload, role, None).await?;
        info!("Registered {} account {}", account.role, account.id);
        Ok(account)
    }

    /// Admin-initiated account creation with an optional avatar. The avatar
    /// file is removed again if the account cannot be created.
    pub async fn add(
        &self,
        caller: &Caller,
        payload: NewAccount,
        avatar: Option<StoredUpload>,
    ) -> CoreResult<Account> {
        let result = self.add_inner(caller, payload, avatar.as_ref()).await;
        if result.is_err() {
            self.discard(avatar.as_ref()).await;
        }
        result
    }

    async fn add_inner(
        &self,
        caller: &Caller,
        payload: NewAccount,
        avatar: Option<&StoredUpload>,
    ) -> CoreResult<Account> {
        authorize(caller, Action::AddAccount)?;
        payload.validate()?;
        let role = payload
            .role
            .ok_or_else(|| CoreError::Validation("role is required".to_string()))?;
        if !role.assignable_by_admin() {
            return Err(CoreError::Validation(format!("Invalid role: {}", role)));
        }

        let account = self
            .create(payload, role, avatar.map(|a| a.url.clone()))
            .await?;
        info!("Admin {} added {} account {}", caller.id, account.role, account.id);
        Ok(account)
    }

    pub async fn login(&self, email: &str, password: &str) -> CoreResult<Account> {
        let invalid = || CoreError::Unauthenticated("Invalid credentials".to_string());

        let account = self
            .accounts
            .find_account_by_email(email)
            .await?
            .ok_or_else(invalid)?;

        let password = password.to_string();
        let stored = account.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .map_err(|e| CoreError::Internal(format!("password check failed: {}", e)))?;
        if !matches {
            warn!("Failed login for account {}", account.id);
            return Err(invalid());
        }
        Ok(account)
    }

    /// Apply `patch` to account `id`. A new avatar replaces the previous
    /// one, whose file is deleted.
    pub async fn update(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: AccountPatch,
        avatar: Option<StoredUpload>,
    ) -> CoreResult<Account> {
        match self.update_inner(caller, id, patch, avatar.as_ref()).await {
            Ok((account, replaced)) => {
                if let Some(old) = replaced {
                    self.uploads.remove(&old).await;
                }
                Ok(account)
            }
            Err(e) => {
                self.discard(avatar.as_ref()).await;
                Err(e)
            }
        }
    }

    async fn update_inner(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: AccountPatch,
        avatar: Option<&StoredUpload>,
    ) -> CoreResult<(Account, Option<String>)> {
        let mut account = self.find(id).await?;
        authorize(caller, Action::UpdateAccount(id))?;
        patch.validate()?;

        if let Some(role) = patch.role.filter(|r| *r != account.role) {
            authorize(caller, Action::ChangeRole)?;
            if !role.assignable_by_admin() {
                return Err(CoreError::Validation(format!("Invalid role: {}", role)));
            }
            account.role = role;
        }

        if let Some(email) = patch.email.as_deref().filter(|e| *e != account.email) {
            self.ensure_email_free(email).await?;
        }
        if let Some(cin) = patch.cin.as_deref().filter(|c| *c != account.cin) {
            self.ensure_cin_free(cin).await?;
        }
        patch.apply_profile(&mut account);

        if let Some(password) = patch.password.clone() {
            account.password_hash = hash(password).await?;
        }

        let mut replaced = None;
        if let Some(avatar) = avatar {
            replaced = account.image_url.replace(avatar.url.clone());
        }

        account.updated_at = Utc::now();
        self.accounts.update_account(&account).await?;
        info!("Account {} updated by {}", account.id, caller.id);
        Ok((account, replaced))
    }

    pub async fn delete(&self, caller: &Caller, id: Uuid) -> CoreResult<()> {
        authorize(caller, Action::DeleteAccount)?;
        let account = self.find(id).await?;

        if !self.accounts.delete_account(id).await? {
            return Err(CoreError::NotFound("User not found".to_string()));
        }
        if let Some(url) = &account.image_url {
            self.uploads.remove(url).await;
        }
        info!("Admin {} deleted account {}", caller.id, id);
        Ok(())
    }

    pub async fn current(&self, caller: &Caller) -> CoreResult<Account> {
        self.find(caller.id).await
    }

    pub async fn list(&self, caller: &Caller) -> CoreResult<Vec<Account>> {
        authorize(caller, Action::ListAccounts)?;
        self.accounts.list_accounts().await
    }

    /// Create the bootstrap administrator unless an account with `email`
    /// already exists. Returns whether an account was created.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> CoreResult<bool> {
        if self.accounts.find_account_by_email(email).await?.is_some() {
            return Ok(false);
        }

        let payload = NewAccount {
            user_name: "admin".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Some(Role::Admin),
            cin: "00000000".to_string(),
            adresse: "N/A".to_string(),
            phone: "00000000".to_string(),
        };
        payload.validate()?;
        let account = self.create(payload, Role::Admin, None).await?;
        info!("Created bootstrap admin {}", account.id);
        Ok(true)
    }

    async fn create(
        &self,
        payload: NewAccount,
        role: Role,
        image_url: Option<String>,
    ) -> CoreResult<Account> {
        self.ensure_email_free(&payload.email).await?;
        self.ensure_cin_free(&payload.cin).await?;

        let password_hash = hash(payload.password.clone()).await?;
        let account = payload.into_account(role, password_hash, image_url, Utc::now());
        self.accounts.insert_account(&account).await?;
        Ok(account)
    }

    async fn find(&self, id: Uuid) -> CoreResult<Account> {
        self.accounts
            .find_account(id)
            .await?
            .ok_or_else(|| CoreError::NotFound("User not found".to_string()))
    }

    async fn ensure_email_free(&self, email: &str) -> CoreResult<()> {
        if self.accounts.find_account_by_email(email).await?.is_some() {
            return Err(CoreError::Validation("User already exists".to_string()));
        }
        Ok(())
    }

    async fn ensure_cin_free(&self, cin: &str) -> CoreResult<()> {
        if self.accounts.find_account_by_cin(cin).await?.is_some() {
            return Err(CoreError::Validation("CIN already exists".to_string()));
        }
        Ok(())
    }

    async fn discard(&self, avatar: Option<&StoredUpload>) {
        if let Some(avatar) = avatar {
            self.uploads.remove(&avatar.url).await;
        }
    }
}

async fn hash(password: String) -> CoreResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| CoreError::Internal(format!("password hashing failed: {}", e)))?
}
