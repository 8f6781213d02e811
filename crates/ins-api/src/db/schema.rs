//! Database schema types

use chrono::{DateTime, Utc};
use ins_core::{Account, Contract, ContractView, CoreError, PublicIdentity};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct User {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub cin: String,
    pub adresse: String,
    pub phone: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct ContractRecord {
    pub id: Uuid,
    pub contract_type: String,
    pub description: String,
    pub duration: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub price: Decimal,
    pub agent_name: String,
    pub agent_email: String,
    pub agent_address: String,
    pub status: String,
    pub pdf_url: Option<String>,
    pub signature_url: Option<String>,
    pub logo_url: Option<String>,
    pub client_user_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub agent_id: Uuid,
    pub client_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contract joined with its agent and client accounts.
#[derive(Debug, FromRow)]
pub struct ContractWithParties {
    #[sqlx(flatten)]
    pub contract: ContractRecord,
    pub agent_account_name: Option<String>,
    pub agent_account_email: Option<String>,
    pub client_account_name: Option<String>,
    pub client_account_email: Option<String>,
}

fn corrupt(column: &str, err: CoreError) -> CoreError {
    CoreError::Storage(format!("bad {} column: {}", column, err))
}

impl TryFrom<User> for Account {
    type Error = CoreError;

    fn try_from(row: User) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            user_name: row.user_name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse().map_err(|e| corrupt("role", e))?,
            cin: row.cin,
            adresse: row.adresse,
            phone: row.phone,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<ContractRecord> for Contract {
    type Error = CoreError;

    fn try_from(row: ContractRecord) -> Result<Self, Self::Error> {
        Ok(Contract {
            id: row.id,
            contract_type: row
                .contract_type
                .parse()
                .map_err(|e| corrupt("contract_type", e))?,
            description: row.description,
            duration: row.duration.parse().map_err(|e| corrupt("duration", e))?,
            start_date: row.start_date,
            end_date: row.end_date,
            price: row.price,
            agent_name: row.agent_name,
            agent_email: row.agent_email,
            agent_address: row.agent_address,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            pdf_url: row.pdf_url,
            signature_url: row.signature_url,
            logo_url: row.logo_url,
            client_user_name: row.client_user_name,
            client_email: row.client_email,
            client_phone: row.client_phone,
            agent_id: row.agent_id,
            client_id: row.client_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn identity(id: Option<Uuid>, name: Option<String>, email: Option<String>) -> Option<PublicIdentity> {
    match (id, name, email) {
        (Some(id), Some(user_name), Some(email)) => Some(PublicIdentity { id, user_name, email }),
        _ => None,
    }
}

impl TryFrom<ContractWithParties> for ContractView {
    type Error = CoreError;

    fn try_from(row: ContractWithParties) -> Result<Self, Self::Error> {
        let agent = identity(
            Some(row.contract.agent_id),
            row.agent_account_name,
            row.agent_account_email,
        );
        let client = identity(
            row.contract.client_id,
            row.client_account_name,
            row.client_account_email,
        );
        Ok(ContractView {
            contract: row.contract.try_into()?,
            agent,
            client,
        })
    }
}
