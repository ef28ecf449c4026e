//! API server configuration.

/// Configuration for the HTTP layer.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL; in-memory store when absent.
    pub database_url: Option<String>,
    /// Mark the refresh-token cookie `Secure`.
    pub cookie_secure: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            database_url: None,
            cookie_secure: true,
        }
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable        | Default          |
    /// |-----------------|------------------|
    /// | `BIND_ADDR`     | `127.0.0.1:3100` |
    /// | `DATABASE_URL`  | unset (memory)   |
    /// | `COOKIE_SECURE` | `true`           |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            cookie_secure: std::env::var("COOKIE_SECURE")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.cookie_secure),
        }
    }
}
