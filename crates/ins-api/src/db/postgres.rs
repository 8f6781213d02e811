//! sqlx-backed account and contract stores

use super::schema::{ContractRecord, ContractWithParties, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ins_core::{
    Account, AccountStore, Contract, ContractFilter, ContractStore, ContractView, CoreError,
    CoreResult, Signing,
};
use sqlx::PgPool;
use uuid::Uuid;

const SELECT_CONTRACT_WITH_PARTIES: &str = r#"
    SELECT c.*,
           a.user_name AS agent_account_name, a.email AS agent_account_email,
           u.user_name AS client_account_name, u.email AS client_account_email
    FROM contracts c
    LEFT JOIN users a ON a.id = c.agent_id
    LEFT JOIN users u ON u.id = c.client_id
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Translate constraint violations into the errors the services expect.
fn storage_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            let message = match db.constraint() {
                Some("users_cin_key") => "CIN already exists",
                Some("users_email_key") => "User already exists",
                _ => "Record already exists",
            };
            return CoreError::Validation(message.to_string());
        }
    }
    CoreError::Storage(err.to_string())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23503"),
        _ => false,
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, account: &Account) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, user_name, email, password_hash, role, cin, adresse, phone,
                               image_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(account.id)
        .bind(&account.user_name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(&account.cin)
        .bind(&account.adresse)
        .bind(&account.phone)
        .bind(&account.image_url)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn find_account(&self, id: Uuid) -> CoreResult<Option<Account>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_account_by_email(&self, email: &str) -> CoreResult<Option<Account>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Account::try_from)
            .transpose()
    }

    async fn find_account_by_cin(&self, cin: &str) -> CoreResult<Option<Account>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE cin = $1")
            .bind(cin)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(Account::try_from)
            .transpose()
    }

    async fn update_account(&self, account: &Account) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET user_name = $2, email = $3, password_hash = $4, role = $5, cin = $6,
                adresse = $7, phone = $8, image_url = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.user_name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(&account.cin)
        .bind(&account.adresse)
        .bind(&account.phone)
        .bind(&account.image_url)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn delete_account(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    CoreError::Conflict("User still has contracts".to_string())
                } else {
                    storage_error(e)
                }
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_accounts(&self) -> CoreResult<Vec<Account>> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }
}

#[async_trait]
impl ContractStore for PgStore {
    async fn insert_contract(&self, contract: &Contract) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contracts (id, contract_type, description, duration, start_date, end_date,
                                   price, agent_name, agent_email, agent_address, status, pdf_url,
                                   signature_url, logo_url, client_user_name, client_email,
                                   client_phone, agent_id, client_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21)
            "#,
        )
        .bind(contract.id)
        .bind(contract.contract_type.as_str())
        .bind(&contract.description)
        .bind(contract.duration.as_str())
        .bind(contract.start_date)
        .bind(contract.end_date)
        .bind(contract.price)
        .bind(&contract.agent_name)
        .bind(&contract.agent_email)
        .bind(&contract.agent_address)
        .bind(contract.status.as_str())
        .bind(&contract.pdf_url)
        .bind(&contract.signature_url)
        .bind(&contract.logo_url)
        .bind(&contract.client_user_name)
        .bind(&contract.client_email)
        .bind(&contract.client_phone)
        .bind(contract.agent_id)
        .bind(contract.client_id)
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn find_contract(&self, id: Uuid) -> CoreResult<Option<ContractView>> {
        let sql = format!("{} WHERE c.id = $1", SELECT_CONTRACT_WITH_PARTIES);
        sqlx::query_as::<_, ContractWithParties>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .map(ContractView::try_from)
            .transpose()
    }

    async fn list_contracts(&self, filter: ContractFilter) -> CoreResult<Vec<ContractView>> {
        let (predicate, owner, now) = match filter {
            ContractFilter::IssuedBy(agent) => ("WHERE c.agent_id = $1", Some(agent), None),
            ContractFilter::SignedBy(client) => ("WHERE c.client_id = $1", Some(client), None),
            ContractFilter::All => ("", None, None),
            ContractFilter::Available(now) => (
                "WHERE c.client_id IS NULL AND c.status = 'PENDING' AND c.end_date > $1",
                None,
                Some(now),
            ),
        };
        let sql = format!(
            "{} {} ORDER BY c.created_at DESC",
            SELECT_CONTRACT_WITH_PARTIES, predicate
        );

        let mut query = sqlx::query_as::<_, ContractWithParties>(&sql);
        if let Some(owner) = owner {
            query = query.bind(owner);
        }
        if let Some(now) = now {
            query = query.bind(now);
        }

        query
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(ContractView::try_from)
            .collect()
    }

    async fn sign_contract(&self, id: Uuid, signing: &Signing) -> CoreResult<Option<Contract>> {
        sqlx::query_as::<_, ContractRecord>(
            r#"
            UPDATE contracts
            SET client_id = $2, client_user_name = $3, client_email = $4, client_phone = $5,
                signature_url = $6, pdf_url = $7, status = 'SIGNED', updated_at = $8
            WHERE id = $1 AND status = 'PENDING' AND end_date > $8
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(signing.client_id)
        .bind(&signing.snapshot.user_name)
        .bind(&signing.snapshot.email)
        .bind(&signing.snapshot.phone)
        .bind(&signing.signature_url)
        .bind(&signing.pdf_url)
        .bind(signing.signed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .map(Contract::try_from)
        .transpose()
    }

    async fn expire_contracts(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE contracts
            SET status = 'EXPIRED', updated_at = $1
            WHERE status IN ('PENDING', 'SIGNED') AND end_date <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}
