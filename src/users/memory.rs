use super::{StoreError, User, UserStore};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// In-memory `UserStore` for tests.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.iter().any(|user| user.email == email) {
            return Err(StoreError::Duplicate);
        }

        let id = i32::try_from(users.len()).unwrap_or(i32::MAX).saturating_add(1);
        let user = User {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        };
        users.push(user.clone());

        Ok(user)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_duplicate_email() -> Result<(), StoreError> {
        let store = MemoryUserStore::default();
        let first = store.create("a@example.com", "hash").await?;
        assert_eq!(first.id, 1);

        let second = store.create("a@example.com", "other").await;
        assert!(matches!(second, Err(StoreError::Duplicate)));

        let found = store.find_by_email("a@example.com").await?;
        assert_eq!(found.map(|user| user.password_hash), Some("hash".to_string()));
        Ok(())
    }
}
