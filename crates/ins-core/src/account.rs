//! Account model: roles, stored accounts and the payloads that create or
//! modify them.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::CoreError;

/// National IDs and phone numbers are exactly eight digits.
static EIGHT_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{8}$").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Client,
    Agent,
    Superviseur,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
            Role::Agent => "agent",
            Role::Superviseur => "superviseur",
        }
    }

    /// Roles an administrator may hand out when adding or editing an account.
    pub fn assignable_by_admin(&self) -> bool {
        match self {
            Role::Client | Role::Agent | Role::Superviseur => true,
            Role::Admin => false,
        }
    }

    /// Roles a visitor may pick when registering themselves.
    pub fn self_registrable(&self) -> bool {
        self.assignable_by_admin()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            "agent" => Ok(Role::Agent),
            "superviseur" => Ok(Role::Superviseur),
            other => Err(CoreError::Validation(format!("Invalid role: {}", other))),
        }
    }
}

/// A stored account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    #[serde(rename = "CIN")]
    pub cin: String,
    pub adresse: String,
    #[serde(rename = "numéroTéléphone")]
    pub phone: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            id: self.id,
            user_name: self.user_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// The subset of an account shown next to a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
}

/// Registration or admin-add payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    #[validate(length(min = 1, message = "userName is required"))]
    pub user_name: String,

    #[validate(email(message = "email is invalid"))]
    pub email: String,

    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,

    pub role: Option<Role>,

    #[serde(rename = "CIN", alias = "cin")]
    #[validate(regex(path = "EIGHT_DIGITS", message = "CIN must be exactly 8 digits"))]
    pub cin: String,

    #[validate(length(min = 1, message = "adresse is required"))]
    pub adresse: String,

    #[serde(rename = "numéroTéléphone", alias = "numeroTelephone", alias = "phone")]
    #[validate(regex(path = "EIGHT_DIGITS", message = "phone must be exactly 8 digits"))]
    pub phone: String,
}

impl NewAccount {
    pub fn into_account(
        self,
        role: Role,
        password_hash: String,
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Account {
        Account {
            id: Uuid::new_v4(),
            user_name: self.user_name,
            email: self.email,
            password_hash,
            role,
            cin: self.cin,
            adresse: self.adresse,
            phone: self.phone,
            image_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields an account update may touch. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AccountPatch {
    #[validate(length(min = 1, message = "userName cannot be empty"))]
    pub user_name: Option<String>,

    #[validate(email(message = "email is invalid"))]
    pub email: Option<String>,

    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: Option<String>,

    pub role: Option<Role>,

    #[serde(rename = "CIN", alias = "cin")]
    #[validate(regex(path = "EIGHT_DIGITS", message = "CIN must be exactly 8 digits"))]
    pub cin: Option<String>,

    #[validate(length(min = 1, message = "adresse cannot be empty"))]
    pub adresse: Option<String>,

    #[serde(rename = "numéroTéléphone", alias = "numeroTelephone", alias = "phone")]
    #[validate(regex(path = "EIGHT_DIGITS", message = "phone must be exactly 8 digits"))]
    pub phone: Option<String>,
}

impl AccountPatch {
    /// Copy the profile fields onto `account`. Role and password are applied
    /// by the account service, which owns the rules for both.
    pub fn apply_profile(&self, account: &mut Account) {
        if let Some(user_name) = &self.user_name {
            account.user_name = user_name.clone();
        }
        if let Some(email) = &self.email {
            account.email = email.clone();
        }
        if let Some(cin) = &self.cin {
            account.cin = cin.clone();
        }
        if let Some(adresse) = &self.adresse {
            account.adresse = adresse.clone();
        }
        if let Some(phone) = &self.phone {
            account.phone = phone.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> NewAccount {
        NewAccount {
            user_name: "Sami Ben Ali".to_string(),
            email: "sami@example.com".to_string(),
            password: "secret123".to_string(),
            role: None,
            cin: "12345678".to_string(),
            adresse: "12 rue de Carthage, Tunis".to_string(),
            phone: "98765432".to_string(),
        }
    }

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::Admin, Role::Client, Role::Agent, Role::Superviseur] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("Manager".parse::<Role>().is_err());
    }

    #[test]
    fn test_default_role_is_client() {
        assert_eq!(Role::default(), Role::Client);
    }

    #[test]
    fn test_admin_role_is_not_assignable() {
        assert!(!Role::Admin.assignable_by_admin());
        assert!(Role::Superviseur.assignable_by_admin());
    }

    #[test]
    fn test_valid_registration_passes() {
        assert!(registration().validate().is_ok());
    }

    #[test]
    fn test_cin_and_phone_must_be_eight_digits() {
        let mut payload = registration();
        payload.cin = "1234567".to_string();
        assert!(payload.validate().is_err());

        let mut payload = registration();
        payload.phone = "9876543a".to_string();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_registration_accepts_portal_field_names() {
        let payload: NewAccount = serde_json::from_value(serde_json::json!({
            "userName": "Amira",
            "email": "amira@example.com",
            "password": "secret123",
            "role": "agent",
            "CIN": "11223344",
            "adresse": "Sfax",
            "numéroTéléphone": "22334455"
        }))
        .unwrap();
        assert_eq!(payload.role, Some(Role::Agent));
        assert_eq!(payload.phone, "22334455");
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let account = registration().into_account(Role::Client, "hash".into(), None, Utc::now());
        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["CIN"], "12345678");
        assert_eq!(json["role"], "client");
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut account = registration().into_account(Role::Client, "hash".into(), None, Utc::now());
        let patch = AccountPatch {
            adresse: Some("Sousse".to_string()),
            ..Default::default()
        };
        patch.apply_profile(&mut account);
        assert_eq!(account.adresse, "Sousse");
        assert_eq!(account.email, "sami@example.com");
    }
}
