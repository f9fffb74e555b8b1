use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::credentials::{hash_password, validate_password_strength, verify_password, TokenService};
use crate::config::AdminSeedConfig;
use crate::error::{AppError, AuthError, Result};
use crate::models::user::normalize_email;
use crate::models::{NewUser, Role, UserProfile};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "last name is required"))]
    pub last_name: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// A signed token together with the account it was issued for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
    tokens: TokenService,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// New accounts always get the `user` role.
    pub async fn register(&self, req: RegisterRequest) -> Result<Session> {
        req.validate()?;

        let email = normalize_email(&req.email);
        let password = req.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

        let user = self
            .store
            .create_user(NewUser {
                email,
                password_hash,
                first_name: req.first_name.trim().to_string(),
                last_name: req.last_name.trim().to_string(),
                role: Role::User,
                phone: req.phone,
                address: req.address,
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        let token = self.tokens.issue_token(user.id)?;
        Ok(Session {
            token,
            user: user.into(),
        })
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, req: LoginRequest) -> Result<Session> {
        req.validate()?;

        let user = self
            .store
            .find_user_by_email(&normalize_email(&req.email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&req.password, &hash)).await?;
        if !matches {
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.tokens.issue_token(user.id)?;
        Ok(Session {
            token,
            user: user.into(),
        })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn list(&self) -> Result<Vec<UserProfile>> {
        Ok(self
            .store
            .list_users()
            .await?
            .into_iter()
            .map(UserProfile::from)
            .collect())
    }

    pub async fn promote(&self, user_id: Uuid) -> Result<UserProfile> {
        let user = self
            .store
            .set_user_role(user_id, Role::Admin)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        info!(user_id = %user.id, "user promoted to admin");
        Ok(user.into())
    }

    /// Role of a live account, `None` when it no longer exists.
    pub async fn role_of(&self, user_id: Uuid) -> Result<Option<Role>> {
        Ok(self.store.find_user_by_id(user_id).await?.map(|u| u.role))
    }

    /// Creates the first admin account, or promotes the configured account
    /// when it already exists. Nothing happens while an admin is present.
    pub async fn ensure_admin(&self, seed: &AdminSeedConfig) -> Result<()> {
        let (Some(email), Some(password)) = (&seed.email, &seed.password) else {
            warn!("ADMIN_EMAIL or ADMIN_PASSWORD not set, skipping admin seed");
            return Ok(());
        };

        if self.store.count_admins().await? > 0 {
            info!("admin user already exists");
            return Ok(());
        }

        let email = normalize_email(email);
        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            self.promote(existing.id).await?;
            return Ok(());
        }

        let password = password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
        self.store
            .create_user(NewUser {
                email,
                password_hash,
                first_name: "Admin".to_string(),
                last_name: "User".to_string(),
                role: Role::Admin,
                phone: None,
                address: None,
            })
            .await?;
        info!("initial admin user created");
        Ok(())
    }
}
