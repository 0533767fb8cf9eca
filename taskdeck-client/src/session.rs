use std::sync::Arc;

use taskdeck_core::UserSummary;
use tokio::sync::RwLock;

use crate::database::ClientDatabase;
use crate::errors::ClientResult;

pub const AUTH_TOKEN_KEY: &str = "AUTH_TOKEN";
pub const USER_KEY: &str = "USER";

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: UserSummary,
}

/// The signed-in session, held in memory and mirrored to durable storage.
/// Every component that talks to the API reads its credential from here.
pub struct SessionStore {
    db: Arc<ClientDatabase>,
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    /// Loads whatever a previous run left behind. A half-written or unreadable
    /// session is discarded.
    pub async fn restore(db: Arc<ClientDatabase>) -> ClientResult<Self> {
        let token = db.get_item(AUTH_TOKEN_KEY).await?;
        let user = db.get_item(USER_KEY).await?;

        let current = match (token, user) {
            (Some(token), Some(user)) => match serde_json::from_str::<UserSummary>(&user) {
                Ok(user) => {
                    tracing::debug!(user_id = %user.id, "restored session");
                    Some(Session { token, user })
                }
                Err(e) => {
                    tracing::warn!(%e, "discarding unreadable stored user");
                    None
                }
            },
            (None, None) => None,
            _ => {
                tracing::warn!("discarding incomplete stored session");
                None
            }
        };

        let store = Self {
            db,
            current: RwLock::new(current),
        };
        if store.current.read().await.is_none() {
            store.clear_storage().await?;
        }
        Ok(store)
    }

    pub async fn save(&self, session: Session) -> ClientResult<()> {
        self.db.set_item(AUTH_TOKEN_KEY, &session.token).await?;
        self.db
            .set_item(USER_KEY, &serde_json::to_string(&session.user)?)
            .await?;
        *self.current.write().await = Some(session);
        Ok(())
    }

    /// Forgets the session. Memory is cleared even if storage fails.
    pub async fn clear(&self) -> ClientResult<()> {
        *self.current.write().await = None;
        self.clear_storage().await
    }

    async fn clear_storage(&self) -> ClientResult<()> {
        self.db.remove_item(AUTH_TOKEN_KEY).await?;
        self.db.remove_item(USER_KEY).await
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.current.read().await.as_ref().map(|s| s.token.clone())
    }

    pub async fn user(&self) -> Option<UserSummary> {
        self.current.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }
}
