use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::access::{AccessPolicy, Capability};
use super::domain::{check_email, check_length, Actor, NewUser, Role, User, UserId, UserPatch};
use super::error::CrmError;
use super::repository::{CrmRepository, RepositoryError};

static USER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_user_id() -> UserId {
    UserId(USER_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Principals and their roles. Mutations are gated by [`AccessPolicy`].
pub struct UserDirectory<R> {
    repository: Arc<R>,
}

impl<R> Clone for UserDirectory<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R> UserDirectory<R>
where
    R: CrmRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Seed the first superadmin, returning the existing one when already present.
    pub fn bootstrap_superadmin(&self, username: &str) -> Result<User, CrmError> {
        if let Some(existing) = self
            .repository
            .users(Some(Role::Superadmin))?
            .into_iter()
            .next()
        {
            return Ok(existing);
        }

        let username = validate_username(username)?;
        let user = self.insert(User {
            id: next_user_id(),
            username,
            email: None,
            role: Role::Superadmin,
        })?;
        info!(user_id = %user.id, username = %user.username, "bootstrapped superadmin");
        Ok(user)
    }

    /// Identity lookup for an incoming request.
    pub fn resolve(&self, id: UserId) -> Result<Actor, CrmError> {
        self.repository
            .fetch_user(id)?
            .map(|user| user.actor())
            .ok_or(CrmError::Unauthenticated)
    }

    pub fn role_choices(actor: &Actor) -> Vec<Role> {
        AccessPolicy::assignable_roles(actor.role)
    }

    pub fn list(&self, role: Option<Role>) -> Result<Vec<User>, CrmError> {
        Ok(self.repository.users(role)?)
    }

    pub fn get(&self, id: UserId) -> Result<User, CrmError> {
        self.repository
            .fetch_user(id)?
            .ok_or_else(|| CrmError::not_found(UserId::ENTITY, id.0))
    }

    pub fn create(&self, new_user: NewUser, actor: &Actor) -> Result<User, CrmError> {
        AccessPolicy::check(actor, Capability::CreateUser(new_user.role))?;
        let username = validate_username(&new_user.username)?;
        let email = validate_optional_email(new_user.email)?;

        let user = self.insert(User {
            id: next_user_id(),
            username,
            email,
            role: new_user.role,
        })?;
        info!(user_id = %user.id, role = %user.role, created_by = %actor.id, "user created");
        Ok(user)
    }

    pub fn update(&self, id: UserId, patch: UserPatch, actor: &Actor) -> Result<User, CrmError> {
        let mut user = self.get(id)?;
        AccessPolicy::check(actor, Capability::ManageUser(user.role))?;
        if let Some(role) = patch.role {
            AccessPolicy::check(actor, Capability::ManageUser(role))?;
        }

        if let Some(username) = &patch.username {
            user.username = validate_username(username)?;
        }
        if let Some(email) = patch.email {
            user.email = validate_optional_email(email)?;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }

        self.repository.update_user(user.clone()).map_err(|err| match err {
            RepositoryError::Conflict => {
                CrmError::validation("username", "a user with that username already exists")
            }
            other => other.into(),
        })?;
        Ok(user)
    }

    /// Delete a user; their leads and audit rows remain with the reference cleared.
    pub fn delete(&self, id: UserId, actor: &Actor) -> Result<User, CrmError> {
        let user = self.get(id)?;
        AccessPolicy::check(actor, Capability::ManageUser(user.role))?;

        let user = self.repository.delete_user(id)?;
        info!(user_id = %id, deleted_by = %actor.id, "user deleted");
        Ok(user)
    }

    fn insert(&self, user: User) -> Result<User, CrmError> {
        self.repository.insert_user(user).map_err(|err| match err {
            RepositoryError::Conflict => {
                CrmError::validation("username", "a user with that username already exists")
            }
            other => other.into(),
        })
    }
}

fn validate_username(raw: &str) -> Result<String, CrmError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(CrmError::validation("username", "this field may not be blank"));
    }
    check_length("username", username, 150)?;
    Ok(username.to_string())
}

fn validate_optional_email(email: Option<String>) -> Result<Option<String>, CrmError> {
    match email {
        Some(email) if email.trim().is_empty() => Ok(None),
        Some(email) => {
            check_email(&email)?;
            Ok(Some(email.trim().to_string()))
        }
        None => Ok(None),
    }
}
