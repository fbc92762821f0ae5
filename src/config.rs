/// file: src/config.rs
/// description: Typed environment configuration with strict fail-fast parsing.
/// Configuration — loaded from environment variables (dotenv + real env).
///
/// Required settings must be provided explicitly so production deployments
/// are deliberate; everything with a sane operational default (timeouts,
/// throttles, headers) may be omitted.
use std::net::SocketAddr;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub batch: BatchConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            source: SourceConfig::from_env()?,
            batch: BatchConfig::from_env()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allow_origins: Vec<String>,
}

impl ServerConfig {
    fn from_env() -> anyhow::Result<Self> {
        let cors_allow_origins = env_opt("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            host: env_required_str("HOST")?,
            port: env_required_u16("PORT")?,
            cors_allow_origins,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

// ---------------------------------------------------------------------------
// Database (PostgreSQL content store)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: usize,
}

impl DatabaseConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env_required_str("POSTGRES_HOST")?,
            port: env_required_u16("POSTGRES_PORT")?,
            database: env_required_str("POSTGRES_DB")?,
            user: env_required_str("POSTGRES_USER")?,
            password: env_required_str("POSTGRES_PASSWORD")?,
            max_connections: env_required_usize("DATABASE_MAX_CONNECTIONS")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Source site (the external supplier storefront being mirrored)
// ---------------------------------------------------------------------------

/// A plain desktop-browser UA. The source site serves different (sometimes
/// truncated) markup to obvious bot agents.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Origin of the supplier site, e.g. `https://www.abmgood.com`.
    pub base_url: String,
    /// Path template for the site's own search, query appended URL-encoded.
    pub search_path: String,
    pub user_agent: String,
    pub accept_language: String,
    pub request_timeout_seconds: u64,
    /// Brand key under which mirrored categories are stored.
    pub brand: String,
}

impl SourceConfig {
    fn from_env() -> anyhow::Result<Self> {
        let base_url = env_required_str("SOURCE_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        Ok(Self {
            base_url,
            search_path: env_opt("SOURCE_SEARCH_PATH")
                .unwrap_or_else(|| "/catalogsearch/result/?q=".to_owned()),
            user_agent: env_opt("SOURCE_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            accept_language: env_opt("SOURCE_ACCEPT_LANGUAGE")
                .unwrap_or_else(|| "en-US,en;q=0.9".to_owned()),
            request_timeout_seconds: env_default_u64("SOURCE_TIMEOUT_SECONDS", 20)?,
            brand: env_opt("SOURCE_BRAND").unwrap_or_else(|| "abm".to_owned()),
        })
    }

    /// Absolute URL of the supplier's own search results for `query`.
    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        format!("{}{}{}", self.base_url, self.search_path, encoded)
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Pause between items — a deliberate throughput throttle to stay
    /// within the source site's implicit rate tolerance.
    pub inter_item_delay_ms: u64,
    /// Extra attempts after the first, on network-level failures only.
    pub max_retries: u32,
}

impl BatchConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            inter_item_delay_ms: env_default_u64("BATCH_DELAY_MS", 400)?,
            max_retries: env_default_u32("BATCH_MAX_RETRIES", 2)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Env-reading helpers
// ---------------------------------------------------------------------------

fn env_required_str(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {key}"))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_required_u16(key: &str) -> anyhow::Result<u16> {
    let raw = env_required_str(key)?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("Invalid u16 value for env var {key}: {raw}"))
}

fn env_required_usize(key: &str) -> anyhow::Result<usize> {
    let raw = env_required_str(key)?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("Invalid usize value for env var {key}: {raw}"))
}

fn env_default_u32(key: &str, default: u32) -> anyhow::Result<u32> {
    match env_opt(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid u32 value for env var {key}: {raw}")),
        None => Ok(default),
    }
}

fn env_default_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match env_opt(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid u64 value for env var {key}: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_source() -> SourceConfig {
        SourceConfig {
            base_url: "https://www.abmgood.com".into(),
            search_path: "/catalogsearch/result/?q=".into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            accept_language: "en-US,en;q=0.9".into(),
            request_timeout_seconds: 20,
            brand: "abm".into(),
        }
    }

    #[test]
    fn search_url_encodes_the_query() {
        let cfg = test_source();
        assert_eq!(
            cfg.search_url("T3189"),
            "https://www.abmgood.com/catalogsearch/result/?q=T3189"
        );
        assert_eq!(
            cfg.search_url("qPCR master mix"),
            "https://www.abmgood.com/catalogsearch/result/?q=qPCR+master+mix"
        );
    }
}
