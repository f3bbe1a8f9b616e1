//! Process configuration, read once from the environment at start-up.

use std::net::SocketAddr;

use thiserror::Error;

use formhub_auth::AuthConfig;

const DEV_JWT_SECRET: &str = "formhub-dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES is enabled")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub app_env: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub google_client_id: Option<String>,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            app_env: "development".to_string(),
            use_persistent_stores: false,
            database_url: None,
            database_max_connections: 10,
            google_client_id: None,
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let bind_addr = match var("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: format!("{e}"),
            })?,
            None => defaults.bind_addr,
        };

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            defaults.jwt_secret.clone()
        });

        let use_persistent_stores = match var("USE_PERSISTENT_STORES") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                reason: format!("expected a boolean, got {raw:?}"),
            })?,
            None => false,
        };

        let database_url = var("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let database_max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                reason: format!("{e}"),
            })?,
            None => defaults.database_max_connections,
        };

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_allowed_origins);

        Ok(Self {
            bind_addr,
            jwt_secret,
            frontend_url: var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            app_env: var("APP_ENV").unwrap_or(defaults.app_env),
            use_persistent_stores,
            database_url,
            database_max_connections,
            google_client_id: var("GOOGLE_CLIENT_ID"),
            cors_allowed_origins,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            jwt_secret: self.jwt_secret.clone(),
            ..AuthConfig::default()
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert!(!cfg.use_persistent_stores);
        assert!(!cfg.is_production());
        assert_eq!(cfg.cors_allowed_origins, vec!["http://localhost:5173".to_string()]);
    }

    #[test]
    fn values_are_parsed() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("APP_ENV", "production"),
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/formhub"),
            ("CORS_ALLOWED_ORIGINS", "https://a.test/, https://b.test ,"),
            ("GOOGLE_CLIENT_ID", "  "),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert!(cfg.is_production());
        assert!(cfg.use_persistent_stores);
        assert_eq!(
            cfg.cors_allowed_origins,
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );
        assert_eq!(cfg.google_client_id, None);
    }

    #[test]
    fn persistent_stores_need_a_database() {
        let err = AppConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "maybe")])).is_err());
    }
}
