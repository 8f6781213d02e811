//! Role-based authorization decisions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Role;
use crate::{CoreError, CoreResult};

/// The authenticated principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Every guarded operation of the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AddAccount,
    DeleteAccount,
    ListAccounts,
    /// Edit the profile of the given account.
    UpdateAccount(Uuid),
    ChangeRole,
    CreateContract,
    ListAgentContracts,
    ListClientContracts,
    ListAllContracts,
    ListAvailableContracts,
    ViewContract,
    SignContract,
}

/// Decide whether `caller` may perform `action`.
pub fn authorize(caller: &Caller, action: Action) -> CoreResult<()> {
    let allowed = match action {
        Action::AddAccount | Action::DeleteAccount | Action::ListAccounts | Action::ChangeRole => {
            matches!(caller.role, Role::Admin)
        }
        Action::UpdateAccount(target) => match caller.role {
            Role::Admin => true,
            Role::Client | Role::Agent | Role::Superviseur => caller.id == target,
        },
        Action::CreateContract | Action::ListAgentContracts => match caller.role {
            Role::Agent => true,
            Role::Admin | Role::Client | Role::Superviseur => false,
        },
        Action::ListClientContracts | Action::ListAvailableContracts | Action::SignContract => {
            match caller.role {
                Role::Client => true,
                Role::Admin | Role::Agent | Role::Superviseur => false,
            }
        }
        Action::ListAllContracts => match caller.role {
            Role::Agent | Role::Admin => true,
            Role::Client | Role::Superviseur => false,
        },
        Action::ViewContract => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(CoreError::Forbidden(denial_message(action).to_string()))
    }
}

fn denial_message(action: Action) -> &'static str {
    match action {
        Action::AddAccount => "Access denied. Only admins can add users",
        Action::DeleteAccount => "Access denied. Only admins can delete users",
        Action::ListAccounts => "Access denied. Only admins can view all users",
        Action::UpdateAccount(_) => "You can only update your own profile",
        Action::ChangeRole => "You cannot change role",
        Action::CreateContract | Action::ListAgentContracts => "Access denied. Agents only",
        Action::ListClientContracts | Action::ListAvailableContracts | Action::SignContract => {
            "Access denied. Clients only"
        }
        Action::ListAllContracts | Action::ViewContract => "Access denied",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> Caller {
        Caller::new(Uuid::new_v4(), role)
    }

    #[test]
    fn test_list_all_is_agent_or_admin() {
        assert!(authorize(&caller(Role::Agent), Action::ListAllContracts).is_ok());
        assert!(authorize(&caller(Role::Admin), Action::ListAllContracts).is_ok());
        assert!(matches!(
            authorize(&caller(Role::Client), Action::ListAllContracts),
            Err(CoreError::Forbidden(_))
        ));
        assert!(authorize(&caller(Role::Superviseur), Action::ListAllContracts).is_err());
    }

    #[test]
    fn test_only_clients_sign() {
        assert!(authorize(&caller(Role::Client), Action::SignContract).is_ok());
        assert!(authorize(&caller(Role::Agent), Action::SignContract).is_err());
    }

    #[test]
    fn test_self_update_only_for_non_admins() {
        let me = caller(Role::Client);
        assert!(authorize(&me, Action::UpdateAccount(me.id)).is_ok());
        assert!(authorize(&me, Action::UpdateAccount(Uuid::new_v4())).is_err());
        assert!(authorize(&caller(Role::Admin), Action::UpdateAccount(Uuid::new_v4())).is_ok());
    }

    #[test]
    fn test_any_role_views_a_contract() {
        for role in [Role::Admin, Role::Client, Role::Agent, Role::Superviseur] {
            assert!(authorize(&caller(role), Action::ViewContract).is_ok());
        }
    }
}
