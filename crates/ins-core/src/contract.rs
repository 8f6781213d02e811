//! Insurance contract model and its status machine.
//!
//! A contract is issued by an agent in the `PENDING` state and moves to
//! `SIGNED` exactly once, when a client attaches a signature. Contracts whose
//! coverage period has ended are swept to `EXPIRED`.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::account::{Account, PublicIdentity};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    Sante,
    Auto,
    Scolaire,
    TransportMarchandise,
    Voyage,
    Habitation,
    Accident,
}

impl ContractType {
    pub const ALL: [ContractType; 7] = [
        ContractType::Sante,
        ContractType::Auto,
        ContractType::Scolaire,
        ContractType::TransportMarchandise,
        ContractType::Voyage,
        ContractType::Habitation,
        ContractType::Accident,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Sante => "SANTE",
            ContractType::Auto => "AUTO",
            ContractType::Scolaire => "SCOLAIRE",
            ContractType::TransportMarchandise => "TRANSPORT_MARCHANDISE",
            ContractType::Voyage => "VOYAGE",
            ContractType::Habitation => "HABITATION",
            ContractType::Accident => "ACCIDENT",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Invalid contract type: {}", s)))
    }
}

/// Coverage period chosen at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyDuration {
    #[serde(rename = "6_MONTHS")]
    SixMonths,
    #[serde(rename = "1_YEAR")]
    OneYear,
}

impl PolicyDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyDuration::SixMonths => "6_MONTHS",
            PolicyDuration::OneYear => "1_YEAR",
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            PolicyDuration::SixMonths => 6,
            PolicyDuration::OneYear => 12,
        }
    }

    /// End of coverage for a policy starting at `start`.
    ///
    /// Month arithmetic clamps to the last day of the target month, so
    /// 31 August plus six months is the last day of February.
    pub fn end_date(&self, start: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
        start
            .checked_add_months(Months::new(self.months()))
            .ok_or_else(|| CoreError::Validation("Contract end date is out of range".to_string()))
    }
}

impl fmt::Display for PolicyDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyDuration {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6_MONTHS" => Ok(PolicyDuration::SixMonths),
            "1_YEAR" => Ok(PolicyDuration::OneYear),
            other => Err(CoreError::Validation(format!("Invalid duration: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Pending,
    Signed,
    Expired,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Pending => "PENDING",
            ContractStatus::Signed => "SIGNED",
            ContractStatus::Expired => "EXPIRED",
        }
    }

    /// Whether the expiry sweep may move a contract in this state.
    pub fn can_expire(&self) -> bool {
        match self {
            ContractStatus::Pending | ContractStatus::Signed => true,
            ContractStatus::Expired => false,
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ContractStatus::Pending),
            "SIGNED" => Ok(ContractStatus::Signed),
            "EXPIRED" => Ok(ContractStatus::Expired),
            other => Err(CoreError::Validation(format!("Invalid status: {}", other))),
        }
    }
}

/// Identity of the signing client, copied onto the contract at signing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSnapshot {
    pub user_name: String,
    pub email: String,
    pub phone: String,
}

impl From<&Account> for ClientSnapshot {
    fn from(account: &Account) -> Self {
        Self {
            user_name: account.user_name.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    pub description: String,
    pub duration: PolicyDuration,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(rename = "prix")]
    pub price: Decimal,
    #[serde(rename = "nameAgent")]
    pub agent_name: String,
    #[serde(rename = "emailAssurance")]
    pub agent_email: String,
    #[serde(rename = "adresseAssurance")]
    pub agent_address: String,
    pub status: ContractStatus,
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

impl Contract {
    pub fn client_snapshot(&self) -> Option<ClientSnapshot> {
        match (&self.client_user_name, &self.client_email, &self.client_phone) {
            (Some(user_name), Some(email), Some(phone)) => Some(ClientSnapshot {
                user_name: user_name.clone(),
                email: email.clone(),
                phone: phone.clone(),
            }),
            _ => None,
        }
    }

    /// True when the contract carries a non-empty client name.
    pub fn has_client(&self) -> bool {
        self.client_user_name
            .as_deref()
            .map(|name| !name.trim().is_empty())
            .unwrap_or(false)
    }

    /// Apply the `PENDING -> SIGNED` transition in memory.
    pub fn sign(
        &mut self,
        client_id: Uuid,
        snapshot: ClientSnapshot,
        signature_url: String,
        pdf_url: String,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        match self.status {
            ContractStatus::Pending => {}
            ContractStatus::Signed => {
                return Err(CoreError::Conflict("Contract is already signed".to_string()))
            }
            ContractStatus::Expired => {
                return Err(CoreError::Conflict("Contract has expired".to_string()))
            }
        }
        if self.is_due_for_expiry(now) {
            return Err(CoreError::Conflict("Contract has expired".to_string()));
        }

        self.client_id = Some(client_id);
        self.client_user_name = Some(snapshot.user_name);
        self.client_email = Some(snapshot.email);
        self.client_phone = Some(snapshot.phone);
        self.signature_url = Some(signature_url);
        self.pdf_url = Some(pdf_url);
        self.status = ContractStatus::Signed;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the expiry sweep should move this contract at `now`.
    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status.can_expire() && self.end_date <= now
    }
}

/// Prices are stored as NUMERIC(10, 2).
pub const PRICE_SCALE: u32 = 2;

fn valid_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ValidationError::new("prix must not be negative"));
    }
    if price.normalize().scale() > PRICE_SCALE {
        return Err(ValidationError::new("prix must have at most two decimal places"));
    }
    if *price > Decimal::new(9_999_999_999, PRICE_SCALE) {
        return Err(ValidationError::new("prix is too large"));
    }
    Ok(())
}

/// Creation payload sent by an agent.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContractDraft {
    #[serde(rename = "type")]
    pub contract_type: ContractType,

    #[serde(default)]
    pub description: String,

    pub duration: PolicyDuration,

    #[serde(rename = "prix", alias = "price")]
    #[validate(custom = "valid_price")]
    pub price: Decimal,

    #[serde(rename = "nameAgent")]
    #[validate(length(min = 1, message = "nameAgent is required"))]
    pub agent_name: String,

    #[serde(rename = "emailAssurance")]
    #[validate(email(message = "emailAssurance is invalid"))]
    pub agent_email: String,

    #[serde(rename = "adresseAssurance")]
    #[validate(length(min = 1, message = "adresseAssurance is required"))]
    pub agent_address: String,

    pub logo_url: Option<String>,
}

impl ContractDraft {
    /// Build the pending contract issued by `agent_id` at `now`.
    pub fn into_contract(self, id: Uuid, agent_id: Uuid, now: DateTime<Utc>) -> CoreResult<Contract> {
        let end_date = self.duration.end_date(now)?;
        let mut price = self.price;
        price.rescale(PRICE_SCALE);
        Ok(Contract {
            id,
            contract_type: self.contract_type,
            description: self.description,
            duration: self.duration,
            start_date: now,
            end_date,
            price,
            agent_name: self.agent_name,
            agent_email: self.agent_email,
            agent_address: self.agent_address,
            status: ContractStatus::Pending,
            pdf_url: None,
            signature_url: None,
            logo_url: self.logo_url,
            client_user_name: None,
            client_email: None,
            client_phone: None,
            agent_id,
            client_id: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// A contract together with the public identity of its agent and client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractView {
    #[serde(flatten)]
    pub contract: Contract,
    pub agent: Option<PublicIdentity>,
    pub client: Option<PublicIdentity>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft(duration: PolicyDuration) -> ContractDraft {
        ContractDraft {
            contract_type: ContractType::Auto,
            description: "Tous risques".to_string(),
            duration,
            price: Decimal::new(450, 0),
            agent_name: "Agent A".to_string(),
            agent_email: "agent@assurance.tn".to_string(),
            agent_address: "Avenue Habib Bourguiba".to_string(),
            logo_url: None,
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_six_months_from_january_31() {
        let end = PolicyDuration::SixMonths.end_date(ymd(2024, 1, 31)).unwrap();
        assert_eq!(end, ymd(2024, 7, 31));
    }

    #[test]
    fn test_six_months_clamps_to_end_of_february() {
        let end = PolicyDuration::SixMonths.end_date(ymd(2023, 8, 31)).unwrap();
        assert_eq!(end, ymd(2024, 2, 29));
    }

    #[test]
    fn test_one_year_from_leap_day() {
        let end = PolicyDuration::OneYear.end_date(ymd(2024, 2, 29)).unwrap();
        assert_eq!(end, ymd(2025, 2, 28));
    }

    #[test]
    fn test_new_contract_is_pending_without_client() {
        let contract = draft(PolicyDuration::SixMonths)
            .into_contract(Uuid::new_v4(), Uuid::new_v4(), ymd(2024, 1, 31))
            .unwrap();
        assert_eq!(contract.status, ContractStatus::Pending);
        assert_eq!(contract.end_date, ymd(2024, 7, 31));
        assert!(contract.client_id.is_none());
        assert!(contract.client_snapshot().is_none());
        assert!(!contract.has_client());
    }

    #[test]
    fn test_sign_transitions_once() {
        let mut contract = draft(PolicyDuration::OneYear)
            .into_contract(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .unwrap();
        let client_id = Uuid::new_v4();
        let snapshot = ClientSnapshot {
            user_name: "Client C".to_string(),
            email: "c@example.com".to_string(),
            phone: "22113344".to_string(),
        };

        contract
            .sign(client_id, snapshot.clone(), "/uploads/sig.png".into(), "/uploads/c.pdf".into(), Utc::now())
            .unwrap();
        assert_eq!(contract.status, ContractStatus::Signed);
        assert_eq!(contract.client_id, Some(client_id));
        assert_eq!(contract.client_snapshot(), Some(snapshot.clone()));

        let again = contract.sign(client_id, snapshot, "x".into(), "y".into(), Utc::now());
        assert!(matches!(again, Err(CoreError::Conflict(_))));
    }

    #[test]
    fn test_expiry_is_due_only_after_end_date() {
        let contract = draft(PolicyDuration::SixMonths)
            .into_contract(Uuid::new_v4(), Uuid::new_v4(), ymd(2024, 1, 31))
            .unwrap();
        assert!(!contract.is_due_for_expiry(ymd(2024, 7, 30)));
        assert!(contract.is_due_for_expiry(ymd(2024, 7, 31)));
    }

    #[test]
    fn test_draft_rejects_negative_price() {
        let mut payload = draft(PolicyDuration::SixMonths);
        payload.price = Decimal::new(-1, 0);
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_contract_past_end_date_cannot_be_signed() {
        let mut contract = draft(PolicyDuration::SixMonths)
            .into_contract(Uuid::new_v4(), Uuid::new_v4(), ymd(2024, 1, 31))
            .unwrap();
        let snapshot = ClientSnapshot {
            user_name: "Client C".to_string(),
            email: "c@example.com".to_string(),
            phone: "22113344".to_string(),
        };

        let late = contract.sign(Uuid::new_v4(), snapshot, "s".into(), "p".into(), ymd(2024, 8, 1));
        assert!(matches!(late, Err(CoreError::Conflict(_))));
        assert_eq!(contract.status, ContractStatus::Pending);
        assert!(contract.client_id.is_none());
    }

    #[test]
    fn test_draft_price_precision_and_bound() {
        let mut payload = draft(PolicyDuration::SixMonths);
        payload.price = Decimal::new(123_456, 3);
        assert!(payload.validate().is_err());

        payload.price = Decimal::new(100_000_000, 0);
        assert!(payload.validate().is_err());

        payload.price = Decimal::new(9_999_999_999, 2);
        assert!(payload.validate().is_ok());

        payload.price = Decimal::new(12_500, 3);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_contract_price_is_stored_with_two_decimals() {
        let contract = draft(PolicyDuration::OneYear)
            .into_contract(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .unwrap();
        assert_eq!(contract.price.scale(), PRICE_SCALE);
        assert_eq!(contract.price.to_string(), "450.00");
    }

    #[test]
    fn test_wire_names_match_portal() {
        let payload: ContractDraft = serde_json::from_value(serde_json::json!({
            "type": "TRANSPORT_MARCHANDISE",
            "description": "Marchandises",
            "duration": "1_YEAR",
            "prix": "1200.50",
            "nameAgent": "Agent A",
            "emailAssurance": "agent@assurance.tn",
            "adresseAssurance": "Tunis"
        }))
        .unwrap();
        assert_eq!(payload.contract_type, ContractType::TransportMarchandise);
        assert_eq!(payload.duration, PolicyDuration::OneYear);

        let contract = payload.into_contract(Uuid::new_v4(), Uuid::new_v4(), Utc::now()).unwrap();
        let json = serde_json::to_value(&contract).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["type"], "TRANSPORT_MARCHANDISE");
        assert_eq!(json["nameAgent"], "Agent A");
        assert!(json["clientId"].is_null());
    }
}
