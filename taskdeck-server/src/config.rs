use clap::Parser;

/// Server settings. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "taskdeck-server", about = "Personal task management API")]
pub struct ServerConfig {
    /// SQLite database, e.g. `sqlite:taskdeck.db` or `sqlite::memory:`
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:taskdeck.db")]
    pub database_url: String,

    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8000")]
    pub bind_address: String,

    /// Origins allowed to call the API with credentials (comma separated)
    #[arg(
        long = "frontend-url",
        env = "FRONTEND_URL",
        default_value = "http://localhost:5174",
        value_delimiter = ','
    )]
    pub frontend_urls: Vec<String>,

    /// Credential lifetime; credentials never expire when unset
    #[arg(long, env = "TOKEN_TTL_MINUTES")]
    pub token_ttl_minutes: Option<i64>,

    /// Mark session and CSRF cookies `Secure`
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,
}

impl ServerConfig {
    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        self.token_ttl_minutes.map(chrono::Duration::minutes)
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:taskdeck.db".to_string(),
            bind_address: "0.0.0.0:8000".to_string(),
            frontend_urls: vec!["http://localhost:5174".to_string()],
            token_ttl_minutes: None,
            secure_cookies: false,
        }
    }
}
