use clap::Args;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set to a Postgres connection string")]
    MissingDatabaseUrl,
    #[error("DATABASE_URL `{0}` is not a postgres:// or postgresql:// URL")]
    UnsupportedDatabaseUrl(String),
    #[error("max connections must be at least 1")]
    NoConnections,
}

/// Connection settings, read from flags or the environment (`.env` included).
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,
    #[arg(long, env = "INTRANET_MAX_CONNECTIONS", global = true, default_value_t = 5)]
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    pub fn from_args(args: &ConnectionArgs) -> Result<Self, ConfigError> {
        let database_url = args
            .database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;

        if !(database_url.starts_with("postgres://") || database_url.starts_with("postgresql://")) {
            return Err(ConfigError::UnsupportedDatabaseUrl(database_url.to_string()));
        }

        if args.max_connections == 0 {
            return Err(ConfigError::NoConnections);
        }

        Ok(Config {
            database_url: database_url.to_string(),
            max_connections: args.max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(url: Option<&str>, max_connections: u32) -> ConnectionArgs {
        ConnectionArgs {
            database_url: url.map(str::to_string),
            max_connections,
        }
    }

    #[test]
    fn accepts_postgres_urls() {
        let config = Config::from_args(&args(Some(" postgres://localhost/intranet "), 5)).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/intranet");
        assert_eq!(config.max_connections, 5);
        assert!(Config::from_args(&args(Some("postgresql://db/school"), 2)).is_ok());
    }

    #[test]
    fn rejects_missing_or_blank_url() {
        assert_eq!(
            Config::from_args(&args(None, 5)),
            Err(ConfigError::MissingDatabaseUrl)
        );
        assert_eq!(
            Config::from_args(&args(Some("   "), 5)),
            Err(ConfigError::MissingDatabaseUrl)
        );
    }

    #[test]
    fn rejects_other_schemes_and_zero_pool() {
        assert!(matches!(
            Config::from_args(&args(Some("mysql://localhost/db"), 5)),
            Err(ConfigError::UnsupportedDatabaseUrl(_))
        ));
        assert_eq!(
            Config::from_args(&args(Some("postgres://localhost/db"), 0)),
            Err(ConfigError::NoConnections)
        );
    }
}
