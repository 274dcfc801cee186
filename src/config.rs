//! Configuration manager for leadhub.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8888;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name, also used as JWT issuer.
    pub name: String,
    /// Public URL of the dashboard.
    pub url: String,
    /// HTTP port to listen on.
    pub port: u16,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Persistence backend.
    #[serde(skip_serializing)]
    pub storage: Storage,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Token,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// IP geolocation used by login history.
    #[serde(skip_serializing)]
    pub geolocation: Option<Geolocation>,
    /// Public lead intake.
    #[serde(skip_serializing)]
    pub website: Website,
    /// Authentication cookie.
    #[serde(skip_serializing)]
    pub cookie: Cookie,
    /// Account created on start when missing.
    #[serde(skip_serializing)]
    pub superadmin: Option<Superadmin>,
    /// Metrics and OTLP export.
    #[serde(skip_serializing)]
    pub telemetry: Telemetry,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            url: "http://localhost:3000".to_owned(),
            port: DEFAULT_PORT,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            storage: Storage::default(),
            postgres: None,
            token: Token::default(),
            argon2: None,
            geolocation: None,
            website: Website::default(),
            cookie: Cookie::default(),
            superadmin: None,
            telemetry: Telemetry::default(),
        }
    }
}

/// Where documents are persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    #[default]
    Postgres,
    /// Process memory, lost on restart.
    Memory,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// HMAC secret, overridden by `JWT_SECRET`.
    pub secret: String,
    /// Lifetime of a token.
    pub expiration_days: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            secret: String::default(),
            expiration_days: 7,
        }
    }
}

/// IP geolocation provider.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Geolocation {
    /// Lookup URL, `{ip}` is replaced by the address.
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for Geolocation {
    fn default() -> Self {
        Self {
            url: "http://ip-api.com/json/{ip}".to_owned(),
            timeout_secs: 5,
        }
    }
}

/// Public lead intake configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Website {
    /// Used when the settings document holds no key, overridden by
    /// `WEBSITE_API_KEY`.
    pub api_key: Option<String>,
}

/// Authentication cookie configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Cookie {
    /// Send the cookie over HTTPS only.
    pub secure: bool,
}

/// Bootstrap account.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Superadmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Telemetry configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    /// Expose Prometheus metrics on `/metrics`.
    pub metrics: bool,
    /// OTLP collector for traces and logs.
    pub otlp_endpoint: Option<String>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location, then applies environment overrides.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let mut config = match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader(file) {
                Ok(config) => config,
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        };

        // set app version.
        config.version = VERSION.to_owned();
        config.url = self.normalize_url(&config.url)?;
        config.apply_env();

        Ok(Arc::new(config))
    }

    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.token.secret = secret;
        }
        if let Ok(key) = std::env::var("WEBSITE_API_KEY") {
            self.website.api_key = Some(key);
        }
        if let Some(port) =
            std::env::var("PORT").ok().and_then(|p| p.parse().ok())
        {
            self.port = port;
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let config: Configuration = serde_yaml::from_str(
            r#"
name: leadhub
url: crm.example.com
port: 9000
storage: memory
token:
  secret: s3cr3t
website:
  api_key: public-key
telemetry:
  metrics: true
"#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.storage, Storage::Memory);
        assert_eq!(config.token.secret, "s3cr3t");
        assert_eq!(config.token.expiration_days, 7);
        assert_eq!(config.website.api_key.as_deref(), Some("public-key"));
        assert!(config.telemetry.metrics);
        assert!(config.geolocation.is_none());
    }

    #[test]
    fn test_normalize_url() {
        let config = Configuration::default();
        assert_eq!(
            config.normalize_url("crm.example.com").unwrap(),
            "https://crm.example.com/"
        );
        assert_eq!(
            config.normalize_url("http://localhost:3000").unwrap(),
            "http://localhost:3000/"
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = Configuration::default()
            .path(PathBuf::from("does/not/exist.yaml"))
            .read()
            .unwrap();

        assert_eq!(config.version(), VERSION);
        assert_eq!(config.token.expiration_days, 7);
    }
}
