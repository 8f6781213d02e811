//! Insurance Portal Core
//!
//! This crate holds the domain of the insurance portal: accounts and their
//! roles, insurance contracts and their lifecycle, the contract document
//! renderer, and the storage seams the HTTP server plugs a database into.

pub mod access;
pub mod account;
pub mod accounts;
pub mod contract;
pub mod lifecycle;
pub mod memory;
pub mod password;
pub mod render;
pub mod store;
pub mod uploads;

use thiserror::Error;

pub use access::{authorize, Action, Caller};
pub use account::{Account, AccountPatch, NewAccount, PublicIdentity, Role};
pub use accounts::AccountService;
pub use contract::{
    ClientSnapshot, Contract, ContractDraft, ContractStatus, ContractType, ContractView,
    PolicyDuration,
};
pub use lifecycle::ContractService;
pub use memory::MemoryStore;
pub use render::{DocumentLayout, Renderer, StagedDocument};
pub use store::{AccountStore, ContractFilter, ContractStore, Signing};
pub use uploads::{StoredUpload, Uploads};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::Validation(errors.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
