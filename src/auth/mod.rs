//! Authentication service: registration, login and token resolution.
//!
//! All three operations are stateless. The token carries the subject and
//! expiry; nothing about a session is written to the store.
//!
//! Every authentication failure collapses to [`AppError::Unauthorized`] so
//! a caller cannot probe which accounts exist.

pub mod password;
pub mod token;

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::AppError;
use crate::models::user::{NewUser, Role, User};
use crate::store::{Store, StoreError, UserStore};
use token::{AccessToken, TokenIssuer};

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_NAME_LEN: usize = 100;

/// Input to [`AuthService::register`].
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl Registration {
    /// Trim whitespace and lowercase the email.
    pub fn normalized(self) -> Self {
        Self {
            username: self.username.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            password: self.password,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !USERNAME_RE.is_match(&self.username) {
            return Err(AppError::Validation(
                "username must be 3-32 characters of letters, digits, '_', '.' or '-'".into(),
            ));
        }
        if self.email.len() > 254 || !EMAIL_RE.is_match(&self.email) {
            return Err(AppError::Validation("email is not a valid address".into()));
        }
        let password_len = self.password.chars().count();
        if password_len < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if password_len > MAX_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "password must be at most {} characters",
                MAX_PASSWORD_LEN
            )));
        }
        if self.first_name.chars().count() > MAX_NAME_LEN
            || self.last_name.chars().count() > MAX_NAME_LEN
        {
            return Err(AppError::Validation(format!(
                "names must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(())
    }
}

/// Successful login: the signed token plus the profile it was issued for.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub token: AccessToken,
    pub user: User,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, tokens: TokenIssuer) -> Self {
        Self { store, tokens }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Self-service registration. New accounts are technicians.
    pub async fn register(&self, registration: Registration) -> Result<User, AppError> {
        self.create_user(registration, Role::Technician).await
    }

    /// Create an account with an explicit role. Used by registration and
    /// by the operator CLI.
    pub async fn create_user(&self, registration: Registration, role: Role) -> Result<User, AppError> {
        let registration = registration.normalized();
        registration.validate()?;

        let plaintext = registration.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || password::hash(&plaintext))
            .await
            .context("password hashing task failed")?
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;

        let new_user = NewUser {
            username: registration.username,
            email: registration.email,
            password_hash,
            first_name: registration.first_name,
            last_name: registration.last_name,
            role,
        };

        match self.store.insert_user(new_user).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, username = %user.username, role = %user.role, "user registered");
                Ok(user)
            }
            Err(StoreError::Duplicate(field)) => {
                tracing::debug!(field = %field, "registration rejected: duplicate");
                Err(AppError::Conflict(format!("{} is already registered", field)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginSuccess, AppError> {
        self.login_at(identifier, password, Utc::now()).await
    }

    /// Exchange credentials for a token issued at `now`.
    pub async fn login_at(
        &self,
        identifier: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginSuccess, AppError> {
        let identifier = identifier.trim();
        let record = if identifier.is_empty() {
            None
        } else {
            self.store.find_by_login(identifier).await?
        };

        let plaintext = password.to_string();
        let (user, matched) = match record {
            Some(record) => {
                let hashword = record.password_hash;
                let matched = tokio::task::spawn_blocking(move || password::verify(&plaintext, &hashword))
                    .await
                    .context("password verification task failed")?;
                (Some(record.user), matched)
            }
            None => {
                tokio::task::spawn_blocking(move || password::verify_against_dummy(&plaintext))
                    .await
                    .context("password verification task failed")?;
                (None, false)
            }
        };

        let user = match user {
            Some(user) if matched && user.is_active => user,
            Some(user) if matched => {
                tracing::warn!(username = %user.username, "login rejected: account inactive");
                return Err(AppError::Unauthorized);
            }
            _ => {
                tracing::warn!(identifier = %identifier, "login rejected: bad credentials");
                return Err(AppError::Unauthorized);
            }
        };

        let token = self
            .tokens
            .issue(&user.username, now)
            .context("failed to sign access token")?;
        tracing::info!(username = %user.username, expires_at = %token.expires_at, "access token issued");

        Ok(LoginSuccess { token, user })
    }

    pub async fn current_user(&self, token: &str) -> Result<User, AppError> {
        self.current_user_at(token, Utc::now()).await
    }

    /// Resolve a bearer token, checked against `now`, to its user.
    pub async fn current_user_at(&self, token: &str, now: DateTime<Utc>) -> Result<User, AppError> {
        let claims = self.tokens.verify(token, now).map_err(|e| {
            tracing::debug!("token rejected: {}", e);
            AppError::Unauthorized
        })?;

        match self.store.find_by_username(&claims.sub).await? {
            Some(record) if record.user.is_active => Ok(record.user),
            Some(_) => {
                tracing::warn!(username = %claims.sub, "token rejected: account inactive");
                Err(AppError::Unauthorized)
            }
            None => {
                tracing::warn!(username = %claims.sub, "token rejected: subject no longer exists");
                Err(AppError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::UserStore;
    use chrono::{Duration, TimeZone};
    use jsonwebtoken::Algorithm;

    fn service() -> AuthService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tokens = TokenIssuer::new(b"test-secret", Algorithm::HS256, Duration::minutes(30));
        AuthService::new(store, tokens)
    }

    fn registration(username: &str, email: &str) -> Registration {
        Registration {
            username: username.into(),
            email: email.into(),
            password: "s3cure-pass".into(),
            first_name: "Marie".into(),
            last_name: "Curie".into(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_validate_accepts_well_formed_input() {
        assert!(registration("marie.c", "marie@plant.example").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_username() {
        for name in ["ab", "has space", "way_too_long_username_for_the_rules_here", "semi;colon"] {
            let err = registration(name, "m@plant.example").validate().unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{} should be rejected", name);
        }
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        for email in ["", "no-at-sign", "a@b", "@plant.example", "a@@plant.example"] {
            let err = registration("marie", email).validate().unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{} should be rejected", email);
        }
    }

    #[test]
    fn test_validate_rejects_short_password() {
        let mut reg = registration("marie", "marie@plant.example");
        reg.password = "short".into();
        assert!(matches!(reg.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_normalized_trims_and_lowercases_email() {
        let reg = Registration {
            username: "  marie ".into(),
            email: " Marie@Plant.Example ".into(),
            ..registration("x", "y")
        }
        .normalized();
        assert_eq!(reg.username, "marie");
        assert_eq!(reg.email, "marie@plant.example");
    }

    #[tokio::test]
    async fn test_register_then_login_issues_token_for_subject() {
        let auth = service();
        let user = auth
            .register(registration("marie", "marie@plant.example"))
            .await
            .unwrap();
        assert_eq!(user.role, Role::Technician);
        assert!(user.is_active);

        let login = auth.login_at("marie", "s3cure-pass", t0()).await.unwrap();
        assert_eq!(login.user.id, user.id);
        let claims = auth.tokens().verify(&login.token.token, t0()).unwrap();
        assert_eq!(claims.sub, "marie");
    }

    #[tokio::test]
    async fn test_login_by_email_is_case_insensitive() {
        let auth = service();
        auth.register(registration("marie", "marie@plant.example"))
            .await
            .unwrap();
        let login = auth.login_at("MARIE@plant.example", "s3cure-pass", t0()).await.unwrap();
        assert_eq!(login.user.username, "marie");
    }

    #[tokio::test]
    async fn test_register_duplicate_username_conflicts() {
        let auth = service();
        auth.register(registration("marie", "marie@plant.example"))
            .await
            .unwrap();
        let err = auth
            .register(registration("marie", "other@plant.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let auth = service();
        auth.register(registration("marie", "marie@plant.example"))
            .await
            .unwrap();
        let err = auth
            .register(registration("pierre", "Marie@Plant.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let auth = service();
        auth.register(registration("marie", "marie@plant.example"))
            .await
            .unwrap();

        let wrong = auth.login_at("marie", "not-the-password", t0()).await.unwrap_err();
        let unknown = auth.login_at("nobody", "s3cure-pass", t0()).await.unwrap_err();
        let empty = auth.login_at("", "", t0()).await.unwrap_err();
        assert!(matches!(wrong, AppError::Unauthorized));
        assert!(matches!(unknown, AppError::Unauthorized));
        assert!(matches!(empty, AppError::Unauthorized));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn test_current_user_respects_expiry() {
        let auth = service();
        auth.register(registration("marie", "marie@plant.example"))
            .await
            .unwrap();
        let login = auth.login_at("marie", "s3cure-pass", t0()).await.unwrap();
        let token = &login.token.token;
        let deadline = t0() + Duration::minutes(30);

        let user = auth
            .current_user_at(token, deadline - Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(user.username, "marie");

        let err = auth.current_user_at(token, deadline).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_token_for_missing_user_is_unauthorized() {
        let auth = service();
        let orphan = auth.tokens().issue("ghost", t0()).unwrap();
        let err = auth.current_user_at(&orphan.token, t0()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_login_or_resolve() {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenIssuer::new(b"test-secret", Algorithm::HS256, Duration::minutes(30));
        let auth = AuthService::new(store.clone(), tokens);
        auth.register(registration("marie", "marie@plant.example"))
            .await
            .unwrap();
        let login = auth.login_at("marie", "s3cure-pass", t0()).await.unwrap();

        store.set_active("marie", false).await;
        assert!(store.find_by_username("marie").await.unwrap().is_some());

        assert!(matches!(
            auth.login_at("marie", "s3cure-pass", t0()).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            auth.current_user_at(&login.token.token, t0()).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_create_user_with_explicit_role() {
        let auth = service();
        let user = auth
            .create_user(registration("chief", "chief@plant.example"), Role::Supervisor)
            .await
            .unwrap();
        assert_eq!(user.role, Role::Supervisor);
    }
}
