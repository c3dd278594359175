use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub database: DatabaseConfig,
    pub graph: GraphConfig,
    pub expansion: ExpansionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

/// Which record store the server runs against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Graph,
    #[default]
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Postgres => write!(f, "postgres"),
            StoreBackend::Graph => write!(f, "graph"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "graph" => Ok(StoreBackend::Graph),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Unknown store backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual parts
    pub connection_string: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Base URL of the graph database HTTP API
    pub url: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// Upper bound applied to the `depth` query parameter
    pub max_depth: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "password".to_string(),
            name: "grisera".to_string(),
            max_connections: Some(20),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            user: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the legacy environment variables,
    /// an optional `config` file and `GRISERA_*` variables, in that order
    pub fn load() -> anyhow::Result<Self> {
        let mut defaults = AppConfig::default();
        defaults.apply_legacy_env(|key| std::env::var(key).ok());

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::with_name("config").required(false))
            // GRISERA_SERVER__PORT=8080, GRISERA_STORE__BACKEND=graph, ...
            .add_source(
                config::Environment::with_prefix("GRISERA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }

    /// Fold in the variables older deployments set (`RDB_*`, `DB_*`,
    /// `GRAPH_API_HOST`, `DATABASE_URL`)
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.connection_string = Some(url);
        }
        if let Some(host) = lookup("RDB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("RDB_PORT").and_then(|p| p.parse().ok()) {
            self.database.port = port;
        }
        if let Some(user) = lookup("RDB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("RDB_PASSWORD") {
            self.database.password = password;
        }

        if let Some(host) = lookup("DB_HOST") {
            let port = lookup("DB_PORT").unwrap_or_else(|| "7474".to_string());
            self.graph.url = with_scheme(&format!("{}:{}", host, port));
        } else if let Some(host) = lookup("GRAPH_API_HOST") {
            self.graph.url = with_scheme(&host);
        }
    }

    /// Get the relational database URL
    pub fn database_url(&self) -> String {
        if let Some(connection_string) = &self.database.connection_string {
            return connection_string.clone();
        }

        let db = &self.database;
        format!(
            "postgres://{}:{}@{}:{}/{}",
            db.user, db.password, db.host, db.port, db.name
        )
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn with_scheme(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", host.trim_end_matches('/'))
    }
}
