use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::user::{NewUser, User, UserRepository};
use crate::AuthError;

/// In-memory [`UserRepository`]. Cloning shares the underlying store, so a
/// test can hand a clone to the code under test and inspect state afterward
/// through its own handle.
#[derive(Clone, Default)]
pub struct MockUserRepository {
    inner: Arc<RwLock<MockState>>,
}

#[derive(Default)]
struct MockState {
    users: HashMap<i64, User>,
    next_id: i64,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a ready-made user, returning it with an assigned id.
    pub fn seed(&self, email: &str, name: Option<&str>) -> Result<User, AuthError> {
        let mut state = self.write()?;
        state.next_id += 1;
        let now = Utc::now();
        let user = User {
            id: state.next_id,
            email: email.to_lowercase(),
            name: name.map(str::to_owned),
            verified: true,
            superuser: false,
            external_auth: false,
            disabled_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn user_count(&self) -> usize {
        self.inner.read().map(|s| s.users.len()).unwrap_or(0)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MockState>, AuthError> {
        self.inner
            .write()
            .map_err(|_| AuthError::Database("mock user store lock poisoned".into()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MockState>, AuthError> {
        self.inner
            .read()
            .map_err(|_| AuthError::Database("mock user store lock poisoned".into()))
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AuthError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let needle = email.to_lowercase();
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email.to_lowercase() == needle)
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AuthError> {
        let mut state = self.write()?;
        state.next_id += 1;
        let now = Utc::now();
        let user = User {
            id: state.next_id,
            email: new_user.email.to_lowercase(),
            name: new_user.name,
            verified: new_user.verified,
            superuser: false,
            external_auth: new_user.external_auth,
            disabled_at: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<(), AuthError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user.id) {
            return Err(AuthError::UserNotFound);
        }
        let mut updated = user.clone();
        updated.updated_at = Utc::now();
        state.users.insert(updated.id, updated);
        Ok(())
    }

    async fn disable(&self, id: i64) -> Result<(), AuthError> {
        let mut state = self.write()?;
        let user = state.users.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        if user.disabled_at.is_none() {
            user.disabled_at = Some(Utc::now());
            user.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_by_email_is_case_insensitive() {
        let repo = MockUserRepository::new();
        repo.seed("Alice@Example.com", Some("Alice")).unwrap();

        let found = repo.find_by_email("alice@example.COM").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_disable_is_idempotent() {
        let repo = MockUserRepository::new();
        let user = repo.seed("bob@example.com", None).unwrap();

        repo.disable(user.id).await.unwrap();
        let first = repo.find_by_id(user.id).await.unwrap().unwrap().disabled_at;
        repo.disable(user.id).await.unwrap();
        let second = repo.find_by_id(user.id).await.unwrap().unwrap().disabled_at;

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let repo = MockUserRepository::new();
        let handle = repo.clone();
        repo.seed("carol@example.com", None).unwrap();
        assert_eq!(handle.user_count(), 1);
    }
}
