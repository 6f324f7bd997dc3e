use anyhow::Context;
use jsonwebtoken::Algorithm;

const PLACEHOLDER_SECRET: &str = "CHANGE_ME_SECRET_KEY";
const MIN_PRODUCTION_SECRET_LEN: usize = 32;
/// One year.
pub const MAX_TOKEN_EXPIRE_MINUTES: i64 = 525_600;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres connection string. `None` runs the in-memory fallback store.
    pub database_url: Option<String>,
    pub secret_key: String,
    /// JWT signing algorithm. Only the HMAC family is accepted.
    pub algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    /// Deployment environment name, reported by `/health`.
    pub environment: String,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Token lifetime, clamped to `1..=MAX_TOKEN_EXPIRE_MINUTES`.
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(
            self.access_token_expire_minutes
                .clamp(1, MAX_TOKEN_EXPIRE_MINUTES),
        )
    }

    /// `SECRET_KEY` was not set and the built-in placeholder is in use.
    pub fn uses_placeholder_secret(&self) -> bool {
        self.secret_key == PLACEHOLDER_SECRET
    }

    /// Config for tests and local tooling: in-memory store, HS256, 30 minute tokens.
    pub fn for_development(secret_key: impl Into<String>) -> Self {
        Self {
            port: 8000,
            database_url: None,
            secret_key: secret_key.into(),
            algorithm: Algorithm::HS256,
            access_token_expire_minutes: 30,
            environment: "development".into(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Builds a [`Config`] from an arbitrary variable source.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let environment = lookup("APP_ENV")
        .or_else(|| lookup("RAILWAY_ENVIRONMENT"))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "development".into());
    let production = environment.eq_ignore_ascii_case("production");

    let secret_key = lookup("SECRET_KEY").unwrap_or_else(|| PLACEHOLDER_SECRET.into());
    if secret_key == PLACEHOLDER_SECRET {
        if production {
            anyhow::bail!(
                "SECRET_KEY is still the insecure placeholder. \
                 Set a random key of at least {} bytes before running in production.",
                MIN_PRODUCTION_SECRET_LEN
            );
        }
    } else if production && secret_key.len() < MIN_PRODUCTION_SECRET_LEN {
        anyhow::bail!(
            "SECRET_KEY must be at least {} bytes in production",
            MIN_PRODUCTION_SECRET_LEN
        );
    }

    let algorithm = parse_algorithm(lookup("ALGORITHM").as_deref().unwrap_or("HS256"))?;

    let access_token_expire_minutes = match lookup("ACCESS_TOKEN_EXPIRE_MINUTES") {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("ACCESS_TOKEN_EXPIRE_MINUTES is not an integer: {}", raw))?,
        None => 30,
    };
    if !(1..=MAX_TOKEN_EXPIRE_MINUTES).contains(&access_token_expire_minutes) {
        anyhow::bail!(
            "ACCESS_TOKEN_EXPIRE_MINUTES must be between 1 and {}",
            MAX_TOKEN_EXPIRE_MINUTES
        );
    }

    let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
    if production && database_url.is_none() {
        anyhow::bail!("DATABASE_URL is required in production; the in-memory store is for development only");
    }

    let port = match lookup("PORT") {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("PORT is not a valid port number: {}", raw))?,
        None => 8000,
    };

    Ok(Config {
        port,
        database_url,
        secret_key,
        algorithm,
        access_token_expire_minutes,
        environment,
        cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    })
}

/// Only shared-secret algorithms make sense with `SECRET_KEY`.
pub fn parse_algorithm(raw: &str) -> anyhow::Result<Algorithm> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => anyhow::bail!("unsupported ALGORITHM '{}': expected HS256, HS384 or HS512", other),
    }
}
