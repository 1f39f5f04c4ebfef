use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

use crate::auth::SessionPolicy;

#[derive(Parser, Debug)]
#[command(name = "agora", about = "A small discussion forum server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    pub session_hours: u64,
    pub sweep_interval_secs: u64,
    pub session_policy: SessionPolicy,
    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 8,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session_token".to_string(),
            session_hours: 24,
            sweep_interval_secs: 3600,
            session_policy: SessionPolicy::Replace,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// One year. Longer lifetimes are refused at load time.
pub const MAX_SESSION_HOURS: i64 = 24 * 365;

impl AuthConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        let hours = i64::try_from(self.session_hours)
            .unwrap_or(i64::MAX)
            .min(MAX_SESSION_HOURS);
        chrono::Duration::hours(hours)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn cookie_max_age_secs(&self) -> i64 {
        self.session_ttl().num_seconds()
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("forum.db"));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auth.session_hours == 0 {
            anyhow::bail!("auth.session_hours must be at least 1");
        }
        if i64::try_from(self.auth.session_hours).map_or(true, |h| h > MAX_SESSION_HOURS) {
            anyhow::bail!(
                "auth.session_hours must be at most {}, got {}",
                MAX_SESSION_HOURS,
                self.auth.session_hours
            );
        }
        if self.auth.sweep_interval_secs == 0 {
            anyhow::bail!("auth.sweep_interval_secs must be at least 1");
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            anyhow::bail!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            );
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".agora")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("forum.db"))
    }
}
