//! Role capabilities consulted before any mutation reaches a store.
//!
//! Lead, enrollment and audit operations only need an authenticated [`Actor`], which
//! callers can only obtain through the user directory. Course writes and user
//! management are the gated surfaces.

use super::domain::{Actor, Role};
use super::error::CrmError;

/// Mutations that need more than an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Course create, rename and delete.
    SuperadminOrAdmin,
    CreateUser(Role),
    ManageUser(Role),
}

pub struct AccessPolicy;

impl AccessPolicy {
    pub const fn can_create_user(actor: Role, target: Role) -> bool {
        matches!(
            (actor, target),
            (Role::Superadmin, Role::Admin | Role::SalesRep) | (Role::Admin, Role::SalesRep)
        )
    }

    pub const fn can_manage_user(actor: Role, target: Role) -> bool {
        Self::can_create_user(actor, target)
    }

    pub const fn can_write_courses(actor: Role) -> bool {
        matches!(actor, Role::Superadmin | Role::Admin)
    }

    /// Role choices offered to `actor` when creating or editing users.
    pub fn assignable_roles(actor: Role) -> Vec<Role> {
        [Role::Superadmin, Role::Admin, Role::SalesRep]
            .into_iter()
            .filter(|target| Self::can_create_user(actor, *target))
            .collect()
    }

    pub const fn allows(actor: &Actor, capability: Capability) -> bool {
        match capability {
            Capability::SuperadminOrAdmin => Self::can_write_courses(actor.role),
            Capability::CreateUser(target) => Self::can_create_user(actor.role, target),
            Capability::ManageUser(target) => Self::can_manage_user(actor.role, target),
        }
    }

    pub fn check(actor: &Actor, capability: Capability) -> Result<(), CrmError> {
        if Self::allows(actor, capability) {
            return Ok(());
        }

        let message = match capability {
            Capability::SuperadminOrAdmin => {
                "only superadmin or admin can modify courses".to_string()
            }
            Capability::CreateUser(target) => {
                format!("{} cannot create {} users", actor.role, target)
            }
            Capability::ManageUser(target) => {
                format!("{} cannot manage {} users", actor.role, target)
            }
        };
        Err(CrmError::PermissionDenied(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::domain::UserId;

    fn actor(role: Role) -> Actor {
        Actor {
            id: UserId(1),
            role,
        }
    }

    #[test]
    fn superadmin_creates_admins_and_sales_reps_only() {
        assert!(AccessPolicy::can_create_user(Role::Superadmin, Role::Admin));
        assert!(AccessPolicy::can_create_user(Role::Superadmin, Role::SalesRep));
        assert!(!AccessPolicy::can_create_user(Role::Superadmin, Role::Superadmin));
    }

    #[test]
    fn admin_manages_sales_reps_only() {
        assert!(AccessPolicy::can_manage_user(Role::Admin, Role::SalesRep));
        assert!(!AccessPolicy::can_manage_user(Role::Admin, Role::Admin));
        assert!(!AccessPolicy::can_manage_user(Role::Admin, Role::Superadmin));
    }

    #[test]
    fn sales_rep_manages_no_one() {
        for target in [Role::Superadmin, Role::Admin, Role::SalesRep] {
            assert!(!AccessPolicy::can_create_user(Role::SalesRep, target));
            assert!(!AccessPolicy::can_manage_user(Role::SalesRep, target));
        }
        assert!(AccessPolicy::assignable_roles(Role::SalesRep).is_empty());
    }

    #[test]
    fn assignable_roles_follow_creation_rules() {
        assert_eq!(
            AccessPolicy::assignable_roles(Role::Superadmin),
            vec![Role::Admin, Role::SalesRep]
        );
        assert_eq!(
            AccessPolicy::assignable_roles(Role::Admin),
            vec![Role::SalesRep]
        );
    }

    #[test]
    fn course_writes_require_admin_capability() {
        assert!(AccessPolicy::check(&actor(Role::Admin), Capability::SuperadminOrAdmin).is_ok());
        match AccessPolicy::check(&actor(Role::SalesRep), Capability::SuperadminOrAdmin) {
            Err(CrmError::PermissionDenied(message)) => assert!(message.contains("courses")),
            other => panic!("expected permission denied, got {other:?}"),
        }
    }
}
