use crate::error::{Error, RelayResult};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tokens are treated as expired this long before Google says they are
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Token material authorizing calendar calls on behalf of one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// `None` means the token does not expire
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub last_refresh: DateTime<Utc>,
}

/// Response body of Google's token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space separated list of granted scopes
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    fn granted_scopes(&self) -> Option<Vec<String>> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
    }
}

fn expiry_from(expires_in: Option<i64>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let secs = expires_in?;
    let expiry = TimeDelta::try_seconds(secs.saturating_sub(EXPIRY_MARGIN_SECS))
        .and_then(|lifetime| now.checked_add_signed(lifetime));

    match expiry {
        Some(expiry) => Some(expiry),
        // Beyond the representable range: far future never expires, far past already has
        None if secs > 0 => None,
        None => Some(now),
    }
}

impl Credential {
    /// Build a credential from a code exchange response
    ///
    /// Falls back to the requested scopes when Google omits the `scope` field.
    pub fn from_response(response: TokenResponse, requested_scopes: &[String]) -> Self {
        let now = Utc::now();
        let scopes = response
            .granted_scopes()
            .unwrap_or_else(|| requested_scopes.to_vec());

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: expiry_from(response.expires_in, now),
            scopes,
            last_refresh: now,
        }
    }

    /// Apply a refresh response, keeping the old refresh token unless a new one was issued
    pub fn refreshed(mut self, response: TokenResponse) -> Self {
        let now = Utc::now();
        if let Some(scopes) = response.granted_scopes() {
            self.scopes = scopes;
        }
        self.access_token = response.access_token;
        if response.refresh_token.is_some() {
            self.refresh_token = response.refresh_token;
        }
        self.expires_at = expiry_from(response.expires_in, now);
        self.last_refresh = now;
        self
    }

    /// Whether the access token can no longer be used
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }

    /// Whether every required scope was granted
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// File-backed persistence for a single credential
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted credential, `Ok(None)` when no file exists
    pub fn load(&self) -> RelayResult<Option<Credential>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let credential: Credential = serde_json::from_str(&content).map_err(|e| {
            Error::Serialization(format!(
                "Failed to parse token file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Loaded credential from {}", self.path.display());
        Ok(Some(credential))
    }

    /// Overwrite the persisted credential
    pub fn save(&self, credential: &Credential) -> RelayResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write next to the target and rename so readers never see half a file
        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        let content = serde_json::to_string_pretty(credential)?;

        // A leftover temp file would keep its old mode, so start from a fresh one
        match fs::remove_file(&temp_path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(Error::Io(e)),
            _ => {}
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;

        info!("Saved credential to {}", self.path.display());
        Ok(())
    }
}
