// src/config.rs

use std::env;
use dotenvy::dotenv;

/// `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Directory holding the built frontend, served for unknown paths.
    pub static_dir: Option<String>,
    /// Reject answers that arrive after the quiz's time limit has run out.
    pub enforce_time_limit: bool,
    pub time_limit_grace_seconds: i64,
    /// Honour client-supplied `startedAt`/`completedAt` on bulk submissions.
    pub trust_client_timestamps: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = parse_or("JWT_EXPIRATION", 86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            port: parse_or("PORT", 3000),
            cors_origins,
            static_dir: env::var("STATIC_DIR").ok().filter(|d| !d.is_empty()),
            enforce_time_limit: parse_or("ENFORCE_TIME_LIMIT", true),
            time_limit_grace_seconds: parse_or("TIME_LIMIT_GRACE_SECONDS", 30),
            trust_client_timestamps: parse_or("TRUST_CLIENT_TIMESTAMPS", true),
        }
    }

    /// Defaults suitable for tests and local experiments: in-memory store,
    /// no seeded admin.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: MEMORY_DATABASE_URL.to_string(),
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            admin_username: None,
            admin_password: None,
            port: 0,
            cors_origins: Vec::new(),
            static_dir: None,
            enforce_time_limit: true,
            time_limit_grace_seconds: 30,
            trust_client_timestamps: true,
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
