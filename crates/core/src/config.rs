use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_run_mode")]
    pub run_mode: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_db_pool_size")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,
    /// Job retry ceiling before a result is moved to the dead-letter set (spec.md §4.F).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Lease duration on a claimed queue item (spec.md §4.F "lease").
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,
}

fn default_port() -> u16 {
    8000
}
fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}
fn default_service_name() -> String {
    "privacy-analyzer".to_string()
}
fn default_run_mode() -> String {
    "development".to_string()
}
fn default_db_pool_size() -> u32 {
    10
}
fn default_worker_concurrency() -> usize {
    2
}
fn default_max_attempts() -> u32 {
    3
}
fn default_lease_seconds() -> u64 {
    120
}

impl AppConfig {
    /// Parse a base TOML document, then layer environment-variable overrides on top
    /// (spec.md §6 external interfaces). Env vars always win over the file.
    pub fn load_from(toml_str: &str) -> anyhow::Result<Self> {
        let mut cfg: AppConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("REDIS_URL") {
            self.redis.url = v;
        }
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("WORKER_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.worker.concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("CORS_ORIGIN") {
            self.server.cors_origin = v;
        }
        if let Ok(v) = std::env::var("SERVICE_NAME") {
            self.server.service_name = v;
        }
        if let Ok(v) = std::env::var("RUN_MODE") {
            self.server.run_mode = v;
        }
    }

    pub fn is_production(&self) -> bool {
        self.server.run_mode == "production"
    }
}
