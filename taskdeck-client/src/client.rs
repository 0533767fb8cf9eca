use std::sync::Arc;

use taskdeck_core::{LoginRequest, RegisterRequest, UserSummary};

use crate::api::ApiClient;
use crate::board::TaskBoard;
use crate::database::ClientDatabase;
use crate::errors::ClientResult;
use crate::events::EventDispatcher;
use crate::session::{Session, SessionStore};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    /// Where the session is stored, e.g. `sqlite:taskdeck-client.db`.
    pub database_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            database_url: "sqlite:taskdeck-client.db".to_string(),
        }
    }
}

/// Entry point for an application: account operations plus the task board.
pub struct Client {
    session: Arc<SessionStore>,
    api: Arc<ApiClient>,
    events: Arc<EventDispatcher>,
}

impl Client {
    /// Opens local storage, restores any saved session and performs the CSRF
    /// handshake.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let db = Arc::new(ClientDatabase::new(&config.database_url).await?);
        db.run_migrations().await?;

        let session = Arc::new(SessionStore::restore(db).await?);
        let api = Arc::new(ApiClient::new(&config.server_url, session.clone())?);
        api.csrf_handshake().await;

        tracing::info!(server_url = %config.server_url, "client ready");
        Ok(Self {
            session,
            api,
            events: Arc::new(EventDispatcher::new()),
        })
    }

    /// Creates an account. The caller still has to sign in.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        password_confirmation: &str,
    ) -> ClientResult<()> {
        let request = RegisterRequest {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            password_confirmation: Some(password_confirmation.to_string()),
        };
        self.api.register(&request).await?;
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<UserSummary> {
        let request = LoginRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        };
        let response = self.api.login(&request).await?;

        self.session
            .save(Session {
                token: response.token,
                user: response.user.clone(),
            })
            .await?;
        tracing::info!(user_id = %response.user.id, "signed in");
        Ok(response.user)
    }

    /// Signs out. Never fails: a server error is logged and the local session
    /// is cleared regardless.
    pub async fn logout(&self) {
        if self.session.is_authenticated().await {
            if let Err(e) = self.api.logout().await {
                tracing::warn!(%e, "logout request failed; clearing local session anyway");
            }
        }
        self.api.forget_session_cookie();
        if let Err(e) = self.session.clear().await {
            tracing::error!(%e, "failed to clear stored session");
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }

    /// The user saved at sign-in.
    pub async fn current_user(&self) -> Option<UserSummary> {
        self.session.user().await
    }

    /// Asks the server who the stored credential belongs to. A rejected
    /// credential clears the session.
    pub async fn fetch_user(&self) -> ClientResult<UserSummary> {
        match self.api.current_user().await {
            Ok(user) => Ok(user),
            Err(e) => {
                if e.is_unauthorized() {
                    self.session.clear().await?;
                }
                Err(e)
            }
        }
    }

    pub async fn delete_account(&self) -> ClientResult<()> {
        self.api.delete_account().await?;
        self.api.forget_session_cookie();
        self.session.clear().await?;
        tracing::info!("account deleted");
        Ok(())
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// A board over this client's API and session. Boards share the event
    /// dispatcher.
    pub fn board(&self) -> TaskBoard<ApiClient> {
        TaskBoard::new(self.api.clone(), self.events.clone()).with_session(self.session.clone())
    }
}
