use crate::components::google_calendar::credentials::AuthConfig;
use crate::components::google_calendar::oauth::OOB_REDIRECT_URI;
use crate::error::{config_error, RelayResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default location of the optional TOML configuration file
pub const DEFAULT_CONFIG_FILE: &str = "config/gcal-relay.toml";

/// Scopes requested when authorizing against Google
pub const DEFAULT_SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events.readonly",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Default Google Calendar REST API base
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// How the manual authorization fallback receives its code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualAuthMode {
    /// Block on stdin until the operator pastes the code
    Prompt,
    /// Record a pending authorization and wait for `POST /auth/code`
    Deferred,
}

impl FromStr for ManualAuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(ManualAuthMode::Prompt),
            "deferred" => Ok(ManualAuthMode::Deferred),
            other => Err(format!("unknown manual authorization mode '{}'", other)),
        }
    }
}

/// Main configuration structure for the relay
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,
    /// Port the HTTP server listens on
    pub port: u16,
    /// Google OAuth client secret file (installed or web application)
    pub client_secret_path: PathBuf,
    /// File the credential is persisted to
    pub token_path: PathBuf,
    /// Loopback port used by the browser authorization flow
    pub callback_port: u16,
    /// How long to wait for the browser to redirect back
    pub callback_timeout_secs: u64,
    /// Zone used for the default `timeMin` of event listings
    pub timezone: Tz,
    /// Calendar all operations act on
    pub calendar_id: String,
    /// Maximum events returned by a listing
    pub max_results: u32,
    /// Manual authorization behaviour
    pub manual_auth: ManualAuthMode,
    /// Google Calendar REST API base
    pub api_base_url: String,
    /// OAuth scopes requested at authorization time
    pub scopes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4045,
            client_secret_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            callback_port: 8090,
            callback_timeout_secs: 300,
            timezone: chrono_tz::Asia::Shanghai,
            calendar_id: "primary".to_string(),
            max_results: 10,
            manual_auth: ManualAuthMode::Deferred,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Values read from the optional TOML file; everything may be omitted
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    client_secret_path: Option<PathBuf>,
    token_path: Option<PathBuf>,
    callback_port: Option<u16>,
    callback_timeout_secs: Option<u64>,
    timezone: Option<String>,
    calendar_id: Option<String>,
    max_results: Option<u32>,
    manual_auth: Option<ManualAuthMode>,
    api_base_url: Option<String>,
    scopes: Option<Vec<String>>,
}

impl FileConfig {
    /// Read the file if it exists
    fn read(path: &Path) -> RelayResult<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the config file and the environment
    pub fn load() -> RelayResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let config_path =
            env::var("GCAL_RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let file = FileConfig::read(Path::new(&config_path))?;

        Self::from_sources(file, |name| env::var(name).ok())
    }

    /// Merge defaults, file values and environment lookups (environment wins)
    fn from_sources(file: FileConfig, var: impl Fn(&str) -> Option<String>) -> RelayResult<Self> {
        let mut config = Config::default();

        if let Some(host) = file.host {
            config.host = host;
        }
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(path) = file.client_secret_path {
            config.client_secret_path = path;
        }
        if let Some(path) = file.token_path {
            config.token_path = path;
        }
        if let Some(port) = file.callback_port {
            config.callback_port = port;
        }
        if let Some(secs) = file.callback_timeout_secs {
            config.callback_timeout_secs = secs;
        }
        if let Some(zone) = file.timezone {
            config.timezone = parse_timezone(&zone)?;
        }
        if let Some(calendar_id) = file.calendar_id {
            config.calendar_id = calendar_id;
        }
        if let Some(max) = file.max_results {
            config.max_results = max;
        }
        if let Some(mode) = file.manual_auth {
            config.manual_auth = mode;
        }
        if let Some(base) = file.api_base_url {
            config.api_base_url = base;
        }
        if let Some(scopes) = file.scopes {
            config.scopes = scopes;
        }

        if let Some(host) = var("GCAL_RELAY_HOST") {
            config.host = host;
        }
        if let Some(port) = var("GCAL_RELAY_PORT") {
            config.port = parse_var("GCAL_RELAY_PORT", &port)?;
        }
        if let Some(path) = var("GCAL_RELAY_CLIENT_SECRET") {
            config.client_secret_path = PathBuf::from(path);
        }
        if let Some(path) = var("GCAL_RELAY_TOKEN_PATH") {
            config.token_path = PathBuf::from(path);
        }
        if let Some(port) = var("GCAL_RELAY_CALLBACK_PORT") {
            config.callback_port = parse_var("GCAL_RELAY_CALLBACK_PORT", &port)?;
        }
        if let Some(secs) = var("GCAL_RELAY_CALLBACK_TIMEOUT") {
            config.callback_timeout_secs = parse_var("GCAL_RELAY_CALLBACK_TIMEOUT", &secs)?;
        }
        if let Some(zone) = var("GCAL_RELAY_TIMEZONE") {
            config.timezone = parse_timezone(&zone)?;
        }
        if let Some(calendar_id) = var("GCAL_RELAY_CALENDAR_ID") {
            config.calendar_id = calendar_id;
        }
        if let Some(max) = var("GCAL_RELAY_MAX_RESULTS") {
            config.max_results = parse_var("GCAL_RELAY_MAX_RESULTS", &max)?;
        }
        if let Some(mode) = var("GCAL_RELAY_MANUAL_AUTH") {
            config.manual_auth = mode.parse().map_err(|e: String| config_error(&e))?;
        }
        if let Some(base) = var("GCAL_RELAY_API_BASE") {
            config.api_base_url = base;
        }

        if config.scopes.is_empty() {
            return Err(config_error("At least one OAuth scope must be configured"));
        }

        Ok(config)
    }

    /// Address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to the credential manager and OAuth flow
    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            token_path: self.token_path.clone(),
            scopes: self.scopes.clone(),
            callback_port: self.callback_port,
            callback_timeout: Duration::from_secs(self.callback_timeout_secs),
            manual_redirect_uri: OOB_REDIRECT_URI.to_string(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> RelayResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| config_error(&format!("Invalid {} value: {}", name, value)))
}

fn parse_timezone(zone: &str) -> RelayResult<Tz> {
    zone.trim()
        .parse::<Tz>()
        .map_err(|_| config_error(&format!("Unknown timezone: {}", zone)))
}
