use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
pub const DEFAULT_SENT_FOLDER: &str = "[Gmail]/Sent Mail";
pub const DEFAULT_API_KEY_PREFIX: &str = "SG.";
pub const DEFAULT_API_BASE_URL: &str = "https://api.sendgrid.com";
pub const DEFAULT_MAX_RESUME_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_RECIPIENTS: usize = 50;

/// On-disk configuration. Every field is optional; `Settings::from_config`
/// fills in the defaults.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct Config {
    pub bind: Option<String>,
    pub workers: Option<usize>,
    pub upload_dir: Option<String>,
    pub db_path: Option<String>,
    pub smtp_host: Option<String>,
    pub imap_host: Option<String>,
    pub imap_port: Option<u16>,
    pub sent_folder: Option<String>,
    pub api_key_prefix: Option<String>,
    pub api_base_url: Option<String>,
    pub attempt_timeout_secs: Option<u64>,
    pub max_resume_bytes: Option<u64>,
    pub max_page_size: Option<usize>,
    pub max_recipients: Option<usize>,
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub workers: usize,
    pub upload_dir: PathBuf,
    pub db_path: PathBuf,
    pub smtp_host: String,
    pub imap_host: String,
    pub imap_port: u16,
    pub sent_folder: String,
    pub api_key_prefix: String,
    pub api_base_url: String,
    pub attempt_timeout: Duration,
    pub max_resume_bytes: u64,
    pub max_page_size: usize,
    /// Upper bound on `companyEmails` per application.
    pub max_recipients: usize,
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("apply_mailer"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_db_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("applicants.db");
    Ok(p)
}

fn template() -> Config {
    Config {
        bind: Some(DEFAULT_BIND.to_string()),
        workers: Some(4),
        upload_dir: Some("./uploads".to_string()),
        db_path: None,
        smtp_host: Some(DEFAULT_SMTP_HOST.to_string()),
        imap_host: Some(DEFAULT_IMAP_HOST.to_string()),
        imap_port: Some(993),
        sent_folder: Some(DEFAULT_SENT_FOLDER.to_string()),
        api_key_prefix: Some(DEFAULT_API_KEY_PREFIX.to_string()),
        api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
        attempt_timeout_secs: Some(10),
        max_resume_bytes: Some(DEFAULT_MAX_RESUME_BYTES),
        max_page_size: Some(500),
        max_recipients: Some(DEFAULT_MAX_RECIPIENTS),
    }
}

/// Write the template config to `path`, creating parent directories.
pub fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tom = toml::to_string_pretty(&template())?;
    fs::write(path, tom).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

/// Load the config at `path` (or the default location). A missing file is
/// replaced by the template and the defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        write_template(&path)?;
        log::info!(
            "Created template config at {}; running with defaults",
            path.display()
        );
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&path).with_context(|| format!("cannot read {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&s).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}

/// Replace the port of `bind` with `port`.
fn with_port(bind: &str, port: &str) -> String {
    match bind.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind}:{port}"),
    }
}

impl Settings {
    /// Resolve defaults. `PORT` (if set) overrides the port of `bind`.
    pub fn from_config(cfg: &Config, db_path: PathBuf) -> Self {
        let mut bind = cfg.bind.clone().unwrap_or_else(|| DEFAULT_BIND.to_string());
        if let Ok(port) = std::env::var("PORT")
            && !port.trim().is_empty()
        {
            bind = with_port(&bind, port.trim());
        }

        Self {
            bind,
            workers: cfg.workers.unwrap_or(4).max(1),
            upload_dir: PathBuf::from(cfg.upload_dir.as_deref().unwrap_or("./uploads")),
            db_path,
            smtp_host: cfg
                .smtp_host
                .clone()
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            imap_host: cfg
                .imap_host
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAP_HOST.to_string()),
            imap_port: cfg.imap_port.unwrap_or(993),
            sent_folder: cfg
                .sent_folder
                .clone()
                .unwrap_or_else(|| DEFAULT_SENT_FOLDER.to_string()),
            api_key_prefix: cfg
                .api_key_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_PREFIX.to_string()),
            api_base_url: cfg
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            attempt_timeout: Duration::from_secs(cfg.attempt_timeout_secs.unwrap_or(10).max(1)),
            max_resume_bytes: cfg.max_resume_bytes.unwrap_or(DEFAULT_MAX_RESUME_BYTES),
            max_page_size: cfg.max_page_size.unwrap_or(500).max(1),
            max_recipients: cfg
                .max_recipients
                .unwrap_or(DEFAULT_MAX_RECIPIENTS)
                .max(1),
        }
    }
}
