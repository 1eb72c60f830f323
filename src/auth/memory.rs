use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{CreateUserError, UserRepo};
use super::repo_types::{NewUser, User};

/// Process-local user store, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryUserRepo {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new_user.email) {
            return Err(CreateUserError::EmailTaken);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            is_verified: false,
            otp: Some(new_user.otp),
            otp_issued_at: Some(new_user.otp_issued_at),
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_otp(&self, id: Uuid, otp: &str, issued_at: OffsetDateTime) -> anyhow::Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.otp = Some(otp.to_string());
            user.otp_issued_at = Some(issued_at);
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, otp: &str) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if !user.is_verified && user.otp.as_deref() == Some(otp) => {
                user.is_verified = true;
                user.otp = None;
                user.otp_issued_at = None;
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, otp: &str) -> NewUser {
        NewUser {
            name: "Jane".into(),
            email: email.into(),
            password_hash: "$argon2id$fake".into(),
            otp: otp.into(),
            otp_issued_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let repo = InMemoryUserRepo::new();
        repo.create(new_user("a@b.co", "123456")).await.unwrap();
        let err = repo.create(new_user("a@b.co", "654321")).await.unwrap_err();
        assert!(matches!(err, CreateUserError::EmailTaken));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn mark_verified_happens_once() {
        let repo = InMemoryUserRepo::new();
        let user = repo.create(new_user("a@b.co", "123456")).await.unwrap();

        assert!(!repo.mark_verified(user.id, "000000").await.unwrap());
        let unchanged = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert!(!unchanged.is_verified);
        assert_eq!(unchanged.otp.as_deref(), Some("123456"));

        assert!(repo.mark_verified(user.id, "123456").await.unwrap());
        assert!(!repo.mark_verified(user.id, "123456").await.unwrap());

        let verified = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert!(verified.is_verified);
        assert!(verified.otp.is_none());
        assert!(verified.otp_issued_at.is_none());
    }

    #[tokio::test]
    async fn set_otp_replaces_previous_code() {
        let repo = InMemoryUserRepo::new();
        let user = repo.create(new_user("a@b.co", "123456")).await.unwrap();
        repo.set_otp(user.id, "999999", OffsetDateTime::now_utc()).await.unwrap();
        assert!(!repo.mark_verified(user.id, "123456").await.unwrap());
        assert!(repo.mark_verified(user.id, "999999").await.unwrap());
    }
}
