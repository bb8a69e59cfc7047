use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Firebase,
    Sheets,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Firebase => write!(f, "firebase"),
            StoreBackend::Sheets => write!(f, "sheets"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "firebase" => Ok(StoreBackend::Firebase),
            "sheets" => Ok(StoreBackend::Sheets),
            other => anyhow::bail!("Unknown store backend: {}", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LineConfig {
    #[serde(default)]
    pub channel_access_token: String,
    #[serde(default)]
    pub channel_secret: String,
    #[serde(default = "default_line_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default = "default_warning_text")]
    pub warning_text: String,
    /// Reply sent when the bot itself is mentioned. Empty disables it.
    #[serde(default)]
    pub mention_reply: String,
    #[serde(default = "default_sticker_package_id")]
    pub sticker_package_id: String,
    #[serde(default = "default_sticker_id")]
    pub sticker_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    #[serde(default)]
    pub firebase: Option<FirebaseConfig>,
    #[serde(default)]
    pub sheets: Option<SheetsConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FirebaseConfig {
    pub database_url: String,
    #[serde(default = "default_firebase_path")]
    pub path: String,
    pub credentials_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    #[serde(default = "default_sheet_range")]
    pub range: String,
    pub credentials_path: PathBuf,
    #[serde(default = "default_sheets_api_base_url")]
    pub api_base_url: String,
}

fn default_line_api_base_url() -> String {
    "https://api.line.me".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_keyword() -> String {
    "哈囉".to_string()
}

fn default_warning_text() -> String {
    "還敢哈囉啊！\n".to_string()
}

fn default_sticker_package_id() -> String {
    "8515".to_string()
}

fn default_sticker_id() -> String {
    "16581242".to_string()
}

fn default_capacity() -> usize {
    5
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("recallbot.db")
}

fn default_firebase_path() -> String {
    "messages".to_string()
}

fn default_sheet_range() -> String {
    "Messages!A:D".to_string()
}

fn default_sheets_api_base_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: String::new(),
            channel_secret: String::new(),
            api_base_url: default_line_api_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            warning_text: default_warning_text(),
            mention_reply: String::new(),
            sticker_package_id: default_sticker_package_id(),
            sticker_id: default_sticker_id(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: default_sqlite_path(),
            firebase: None,
            sheets: None,
        }
    }
}

impl Config {
    /// Socket address string for the webhook server.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Load the TOML file if present, then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Overlay values from the environment; `lookup` is usually `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = token;
        }
        if let Some(secret) = get("CHANNEL_SECRET") {
            self.line.channel_secret = secret;
        }
        if let Some(backend) = get("RECALLBOT_STORE") {
            self.store.backend = backend.parse()?;
        }

        let credentials = get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from);

        if let Some(url) = get("FIREBASE_DATABASE_URL") {
            match self.store.firebase.as_mut() {
                Some(fb) => fb.database_url = url,
                None => {
                    self.store.firebase = Some(FirebaseConfig {
                        database_url: url,
                        path: default_firebase_path(),
                        credentials_path: credentials.clone().unwrap_or_default(),
                    })
                }
            }
        }
        if let Some(id) = get("SPREADSHEET_ID") {
            match self.store.sheets.as_mut() {
                Some(sh) => sh.spreadsheet_id = id,
                None => {
                    self.store.sheets = Some(SheetsConfig {
                        spreadsheet_id: id,
                        range: default_sheet_range(),
                        credentials_path: credentials.clone().unwrap_or_default(),
                        api_base_url: default_sheets_api_base_url(),
                    })
                }
            }
        }
        if let (Some(range), Some(sh)) = (get("SHEET_RANGE"), self.store.sheets.as_mut()) {
            sh.range = range;
        }
        if let Some(creds) = credentials {
            if let Some(fb) = self.store.firebase.as_mut() {
                fb.credentials_path = creds.clone();
            }
            if let Some(sh) = self.store.sheets.as_mut() {
                sh.credentials_path = creds;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.line.channel_secret.is_empty() {
            anyhow::bail!("LINE channel secret is not configured (CHANNEL_SECRET)");
        }
        if self.line.channel_access_token.is_empty() {
            anyhow::bail!("LINE channel access token is not configured (CHANNEL_ACCESS_TOKEN)");
        }
        if self.window.capacity == 0 {
            anyhow::bail!("window.capacity must be at least 1");
        }
        match self.store.backend {
            StoreBackend::Sqlite => {}
            StoreBackend::Firebase => {
                let fb = self
                    .store
                    .firebase
                    .as_ref()
                    .context("store.backend is firebase but [store.firebase] is missing")?;
                if fb.credentials_path.as_os_str().is_empty() {
                    anyhow::bail!("Firebase credentials path is not configured");
                }
            }
            StoreBackend::Sheets => {
                let sh = self
                    .store
                    .sheets
                    .as_ref()
                    .context("store.backend is sheets but [store.sheets] is missing")?;
                if sh.credentials_path.as_os_str().is_empty() {
                    anyhow::bail!("Sheets credentials path is not configured");
                }
            }
        }
        Ok(())
    }
}
