use medlearn_auth::AuthConfig;
use medlearn_auth::password::check_password_policy;
use medlearn_cv::pdf::{MAX_MARGIN, MIN_MARGIN};
use medlearn_db_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub objects: ObjectsConfig,
    /// Token signing settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Initial admin account
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Storage validation
        if self.storage.backend == StorageBackend::Postgres {
            let Some(pg) = &self.storage.postgres else {
                return Err("storage.backend = \"postgres\" requires [storage.postgres]".into());
            };
            if pg.url.trim().is_empty() {
                return Err("storage.postgres.url must not be empty".into());
            }
            if pg.pool_size == 0 {
                return Err("storage.postgres.pool_size must be > 0".into());
            }
        }
        // Object storage validation
        if self.objects.max_upload_bytes == 0 {
            return Err("objects.max_upload_bytes must be > 0".into());
        }
        if self.objects.backend == ObjectBackend::Filesystem
            && self.objects.root.as_os_str().is_empty()
        {
            return Err("objects.root must be set for the filesystem backend".into());
        }
        if self.objects.allowed_content_types.is_empty() {
            return Err("objects.allowed_content_types must not be empty".into());
        }
        // Auth validation
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        // Bootstrap validation
        match (&self.bootstrap.admin_email, &self.bootstrap.admin_password) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(
                    "bootstrap.admin_email and bootstrap.admin_password must be set together"
                        .into(),
                );
            }
            (Some(_), Some(password)) => {
                check_password_policy(password)
                    .map_err(|e| format!("bootstrap.admin_password: {e}"))?;
            }
            (None, None) => {}
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // PDF validation
        if !(MIN_MARGIN..=MAX_MARGIN).contains(&self.pdf.margin_pt) {
            return Err(format!(
                "pdf.margin_pt must be between {MIN_MARGIN} and {MAX_MARGIN}"
            ));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request body limit for JSON routes. Uploads use `objects.max_upload_bytes`.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectBackend {
    #[default]
    Memory,
    Filesystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectsConfig {
    #[serde(default)]
    pub backend: ObjectBackend,
    /// Root directory for the filesystem backend.
    #[serde(default = "default_objects_root")]
    pub root: PathBuf,
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_content_types")]
    pub allowed_content_types: Vec<String>,
}

fn default_objects_root() -> PathBuf {
    PathBuf::from("data/objects")
}
fn default_max_upload() -> usize {
    10 * 1024 * 1024
}
fn default_content_types() -> Vec<String> {
    [
        "application/pdf",
        "image/jpeg",
        "image/png",
        "text/plain",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            backend: ObjectBackend::default(),
            root: default_objects_root(),
            max_upload_bytes: default_max_upload(),
            allowed_content_types: default_content_types(),
        }
    }
}

impl ObjectsConfig {
    /// Case-insensitive match on the media type, ignoring parameters.
    pub fn is_allowed(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        self.allowed_content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&essence))
    }
}

/// Creates an admin account on first startup when both fields are set.
/// Prefer `MEDLEARN__BOOTSTRAP__ADMIN_PASSWORD` over writing the password to a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

fn default_admin_name() -> String {
    "Administrator".into()
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_email: None,
            admin_password: None,
            admin_name: default_admin_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    #[serde(default = "default_margin")]
    pub margin_pt: f32,
}
fn default_margin() -> f32 {
    medlearn_cv::pdf::DEFAULT_MARGIN
}
impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            margin_pt: default_margin(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "medlearn.toml";

    /// Loads the TOML file (if it exists) and applies environment overrides,
    /// e.g. `MEDLEARN__SERVER__PORT=9090`.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        builder = builder.add_source(
            Environment::with_prefix("MEDLEARN")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("objects.allowed_content_types"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
