use std::env;

use bandicon_server::DEFAULT_PORT;

use crate::BandiconError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Settings read from the environment on start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// Postgres connection url. An in-memory database is used when unset.
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, BandiconError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, BandiconError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("BANDICON_SERVER_PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| BandiconError::Config(format!("Port must be a number, got {port}")))?,
            None => DEFAULT_PORT,
        };

        let max_connections = match lookup("BANDICON_DATABASE_MAX_CONNECTIONS") {
            Some(max) => max.parse().map_err(|_| {
                BandiconError::Config(format!("Max connections must be a number, got {max}"))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            port,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            max_connections,
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::Config;

    fn config(vars: &[(&str, &str)]) -> Result<Config, crate::BandiconError> {
        let vars: HashMap<_, _> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).expect("config is valid");

        assert_eq!(config.port, 9050);
        assert_eq!(config.database_url, None);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn reads_variables() {
        let config = config(&[
            ("BANDICON_SERVER_PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/bandicon"),
            ("BANDICON_DATABASE_MAX_CONNECTIONS", "20"),
        ])
        .expect("config is valid");

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/bandicon")
        );
        assert_eq!(config.max_connections, 20);
    }

    #[test]
    fn invalid_port() {
        assert!(config(&[("BANDICON_SERVER_PORT", "vinyl")]).is_err());
    }
}
