use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use taskdeck_core::validation::{Credentials, Registration};
use taskdeck_core::{DomainError, UserSummary, ValidationErrors};
use uuid::Uuid;

use crate::database::ServerDatabase;
use crate::errors::{ServerError, ServerResult};

pub const TOKEN_PREFIX: &str = "tdk_";
const TOKEN_NAME: &str = "auth_token";

/// How long a validated credential is trusted before the database is asked again.
const SESSION_CACHE_TTL_SECS: i64 = 60;
/// Cache size at which stale entries are swept out.
const SESSION_CACHE_PRUNE_AT: usize = 4096;

/// Identity resolved from a valid credential.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    /// SHA-256 digest of the credential the request presented.
    pub token_hash: String,
}

#[derive(Clone)]
struct AuthSession {
    user_id: Uuid,
    expires_at: Option<DateTime<Utc>>,
    cached_at: DateTime<Utc>,
}

impl AuthSession {
    fn is_fresh(&self, now: DateTime<Utc>, cache_ttl: Duration) -> bool {
        self.expires_at.map_or(true, |at| at > now) && now - self.cached_at < cache_ttl
    }
}

#[derive(Clone)]
pub struct AuthState {
    sessions: Arc<DashMap<String, AuthSession>>,
    db: Arc<ServerDatabase>,
    token_ttl: Option<Duration>,
    cache_ttl: Duration,
}

impl AuthState {
    pub fn new(db: Arc<ServerDatabase>, token_ttl: Option<Duration>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            db,
            token_ttl,
            cache_ttl: Duration::seconds(SESSION_CACHE_TTL_SECS),
        }
    }

    /// Overrides how long validated credentials stay cached.
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    fn remember(&self, token_hash: String, user_id: Uuid, expires_at: Option<DateTime<Utc>>) {
        let now = Utc::now();
        if self.sessions.len() >= SESSION_CACHE_PRUNE_AT {
            let cache_ttl = self.cache_ttl;
            self.sessions
                .retain(|_, session| session.is_fresh(now, cache_ttl));
            tracing::debug!(remaining = self.sessions.len(), "pruned session cache");
        }
        self.sessions.insert(
            token_hash,
            AuthSession {
                user_id,
                expires_at,
                cached_at: now,
            },
        );
    }

    #[cfg(test)]
    fn cached_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn hash_password(password: &str) -> ServerResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2.hash_password(password.as_bytes(), &salt)?;
        Ok(password_hash.to_string())
    }

    pub fn verify_password(password: &str, hash: &str) -> ServerResult<bool> {
        let parsed_hash = PasswordHash::new(hash)?;
        let argon2 = Argon2::default();
        Ok(argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok())
    }

    pub fn generate_auth_token() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 32] = rng.gen();
        format!("{}{}", TOKEN_PREFIX, hex::encode(random_bytes))
    }

    pub fn generate_csrf_token() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 20] = rng.gen();
        hex::encode(random_bytes)
    }

    /// Only this digest is stored; the plain token exists solely on the client.
    pub fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    pub fn tokens_match(expected: &str, presented: &str) -> bool {
        expected.len() == presented.len()
            && bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
    }

    pub async fn register(&self, registration: Registration) -> ServerResult<UserSummary> {
        if self.db.find_user_by_email(&registration.email).await?.is_some() {
            let mut errors = ValidationErrors::new();
            errors.add("email", "The email has already been taken.");
            return Err(DomainError::Validation(errors).into());
        }

        let password_hash = Self::hash_password(&registration.password)?;
        let user = self
            .db
            .create_user(&registration.name, &registration.email, &password_hash)
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration of the same address.
                ServerError::DatabaseError(ref db_err) if ServerDatabase::is_unique_violation(db_err) => {
                    let mut errors = ValidationErrors::new();
                    errors.add("email", "The email has already been taken.");
                    DomainError::Validation(errors).into()
                }
                other => other,
            })?;

        tracing::info!(user_id = %user.id, "registered user");
        Ok(user.summary())
    }

    /// Verifies the password and issues a new credential.
    pub async fn login(&self, credentials: &Credentials) -> ServerResult<(UserSummary, String)> {
        let user = match self.db.find_user_by_email(&credentials.email).await? {
            Some(user) => user,
            None => {
                tracing::warn!("login attempt for unknown email");
                return Err(DomainError::Authentication("Invalid credentials".into()).into());
            }
        };

        if !Self::verify_password(&credentials.password, &user.password_hash).unwrap_or(false) {
            tracing::warn!(user_id = %user.id, "login attempt with wrong password");
            return Err(DomainError::Authentication("Invalid credentials".into()).into());
        }

        let token = Self::generate_auth_token();
        let token_hash = Self::hash_token(&token);
        let expires_at = self.token_ttl.map(|ttl| Utc::now() + ttl);
        self.db
            .insert_token(&user.id, &token_hash, TOKEN_NAME, expires_at)
            .await?;

        tracing::info!(user_id = %user.id, "issued credential");
        Ok((user.summary(), token))
    }

    /// Resolves a presented credential to its user. A fresh cache hit skips the
    /// database; otherwise the row is checked and its `last_used_at` bumped.
    pub async fn authenticate(&self, token: &str) -> ServerResult<AuthUser> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(DomainError::Authentication("malformed credential".into()).into());
        }
        let token_hash = Self::hash_token(token);
        let now = Utc::now();

        if let Some(session) = self.sessions.get(&token_hash).map(|s| s.clone()) {
            if session.is_fresh(now, self.cache_ttl) {
                return Ok(AuthUser {
                    user_id: session.user_id,
                    token_hash,
                });
            }
        }

        let record = match self.db.find_token(&token_hash).await? {
            Some(record) => record,
            None => {
                self.sessions.remove(&token_hash);
                return Err(DomainError::Authentication("unknown credential".into()).into());
            }
        };

        if record.expires_at.is_some_and(|at| at <= now) {
            tracing::debug!(token_id = %record.id, "credential expired");
            self.sessions.remove(&token_hash);
            self.db.delete_token(&token_hash).await?;
            return Err(DomainError::Authentication("expired credential".into()).into());
        }

        self.db.touch_token(&token_hash).await?;
        self.remember(token_hash.clone(), record.user_id, record.expires_at);

        Ok(AuthUser {
            user_id: record.user_id,
            token_hash,
        })
    }

    /// Revokes the credential a request presented, whether or not it is still
    /// valid.
    pub async fn revoke(&self, token: &str) -> ServerResult<()> {
        self.logout(&Self::hash_token(token)).await
    }

    /// Revokes one credential. Revoking an unknown credential is not an error.
    pub async fn logout(&self, token_hash: &str) -> ServerResult<()> {
        self.sessions.remove(token_hash);
        if self.db.delete_token(token_hash).await? {
            tracing::info!("revoked credential");
        }
        Ok(())
    }

    pub async fn current_user(&self, user_id: &Uuid) -> ServerResult<UserSummary> {
        self.db
            .get_user(user_id)
            .await?
            .map(|user| user.summary())
            .ok_or_else(|| DomainError::Authentication("user no longer exists".into()).into())
    }

    /// Deletes the account. Its tasks and credentials cascade away.
    pub async fn delete_account(&self, user_id: &Uuid) -> ServerResult<()> {
        for token_hash in self.db.user_token_hashes(user_id).await? {
            self.sessions.remove(&token_hash);
        }
        self.db.delete_user(user_id).await?;
        tracing::info!(%user_id, "deleted account");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_token_generation() {
        let token1 = AuthState::generate_auth_token();
        let token2 = AuthState::generate_auth_token();

        assert_ne!(token1, token2);
        assert!(token1.starts_with(TOKEN_PREFIX));
        assert_eq!(token1.len(), TOKEN_PREFIX.len() + 64);
    }

    #[test]
    fn test_token_hash_is_stable_and_opaque() {
        let token = AuthState::generate_auth_token();
        let digest = AuthState::hash_token(&token);
        assert_eq!(digest, AuthState::hash_token(&token));
        assert_eq!(digest.len(), 64);
        assert!(!digest.contains(&token[TOKEN_PREFIX.len()..]));
    }

    #[test]
    fn test_password_hashing() {
        let hash = AuthState::hash_password("correct horse").unwrap();
        assert!(AuthState::verify_password("correct horse", &hash).unwrap());
        assert!(!AuthState::verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_tokens_match() {
        assert!(AuthState::tokens_match("abc123", "abc123"));
        assert!(!AuthState::tokens_match("abc123", "abc124"));
        assert!(!AuthState::tokens_match("abc123", "abc12"));
    }

    async fn auth_with_ttl(ttl: Option<Duration>) -> AuthState {
        let db = ServerDatabase::new("sqlite::memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        AuthState::new(Arc::new(db), ttl)
    }

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Ada".into(),
            email: email.into(),
            password: "correct horse".into(),
        }
    }

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_register_login_authenticate_logout() {
        let auth = auth_with_ttl(None).await;
        let user = auth.register(registration("ada@example.com")).await.unwrap();

        let (summary, token) = auth
            .login(&credentials("ada@example.com", "correct horse"))
            .await
            .unwrap();
        assert_eq!(summary.id, user.id);

        let identity = auth.authenticate(&token).await.unwrap();
        assert_eq!(identity.user_id, user.id);

        auth.logout(&identity.token_hash).await.unwrap();
        auth.logout(&identity.token_hash).await.unwrap();
        assert!(auth.authenticate(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_validation_error() {
        let auth = auth_with_ttl(None).await;
        auth.register(registration("ada@example.com")).await.unwrap();

        let err = auth
            .register(registration("Ada@Example.com"))
            .await
            .unwrap_err();
        match err {
            ServerError::Domain(DomainError::Validation(errors)) => assert!(errors.has("email")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let auth = auth_with_ttl(None).await;
        auth.register(registration("ada@example.com")).await.unwrap();

        let err = auth
            .login(&credentials("ada@example.com", "wrong horse"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Domain(DomainError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let auth = auth_with_ttl(Some(Duration::seconds(-1))).await;
        auth.register(registration("ada@example.com")).await.unwrap();
        let (_, token) = auth
            .login(&credentials("ada@example.com", "correct horse"))
            .await
            .unwrap();

        assert!(auth.authenticate(&token).await.is_err());
        assert!(auth
            .db
            .find_token(&AuthState::hash_token(&token))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cache_is_filled_on_first_use_and_bumps_last_used() {
        let auth = auth_with_ttl(None).await.with_cache_ttl(Duration::zero());
        auth.register(registration("ada@example.com")).await.unwrap();
        let (_, token) = auth
            .login(&credentials("ada@example.com", "correct horse"))
            .await
            .unwrap();
        assert_eq!(auth.cached_sessions(), 0);
        let token_hash = AuthState::hash_token(&token);

        auth.authenticate(&token).await.unwrap();
        let first = auth.db.find_token(&token_hash).await.unwrap().unwrap();
        assert!(first.last_used_at.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        auth.authenticate(&token).await.unwrap();
        let second = auth.db.find_token(&token_hash).await.unwrap().unwrap();
        assert!(second.last_used_at > first.last_used_at);
        assert_eq!(auth.cached_sessions(), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_entries_are_pruned() {
        let auth = auth_with_ttl(None).await.with_cache_ttl(Duration::zero());
        for _ in 0..SESSION_CACHE_PRUNE_AT {
            auth.remember(AuthState::generate_csrf_token(), Uuid::new_v4(), None);
        }
        assert_eq!(auth.cached_sessions(), SESSION_CACHE_PRUNE_AT);

        auth.remember("latest".into(), Uuid::new_v4(), None);
        assert_eq!(auth.cached_sessions(), 1);
    }

    #[tokio::test]
    async fn test_revoke_by_plain_token() {
        let auth = auth_with_ttl(None).await;
        auth.register(registration("ada@example.com")).await.unwrap();
        let (_, token) = auth
            .login(&credentials("ada@example.com", "correct horse"))
            .await
            .unwrap();
        auth.authenticate(&token).await.unwrap();

        auth.revoke(&token).await.unwrap();
        assert!(auth.authenticate(&token).await.is_err());
        assert_eq!(auth.cached_sessions(), 0);
    }
}
