use super::oauth::PendingAuthorization;
use crate::config::ManualAuthMode;
use crate::error::{authorization_error, other_error, RelayResult};
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::info;

/// Source of the code for a manual authorization
#[async_trait]
pub trait CodePrompt: Send + Sync {
    /// `Ok(None)` means the code will arrive later through `submit_code`
    async fn request_code(&self, pending: &PendingAuthorization) -> RelayResult<Option<String>>;
}

/// Reads the code from stdin; blocks until the operator enters a line
pub struct TerminalPrompt;

#[async_trait]
impl CodePrompt for TerminalPrompt {
    async fn request_code(&self, pending: &PendingAuthorization) -> RelayResult<Option<String>> {
        info!(
            "Please visit this URL on a device with a web browser: {}",
            pending.url
        );

        let code = tokio::task::spawn_blocking(|| -> io::Result<String> {
            let mut stdout = io::stdout();
            write!(stdout, "Enter the authorization code: ")?;
            stdout.flush()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line.trim().to_string())
        })
        .await
        .map_err(|e| other_error(&format!("Prompt task failed: {}", e)))??;

        if code.is_empty() {
            return Err(authorization_error("No authorization code entered"));
        }

        Ok(Some(code))
    }
}

/// Leaves the authorization pending so request threads never block on input
pub struct DeferredPrompt;

#[async_trait]
impl CodePrompt for DeferredPrompt {
    async fn request_code(&self, pending: &PendingAuthorization) -> RelayResult<Option<String>> {
        info!(
            "Manual authorization required. Visit {} and POST the code with state {} to /auth/code",
            pending.url, pending.state
        );
        Ok(None)
    }
}

/// Prompt implementation for the configured mode
pub fn prompt_for(mode: ManualAuthMode) -> Arc<dyn CodePrompt> {
    match mode {
        ManualAuthMode::Prompt => Arc::new(TerminalPrompt),
        ManualAuthMode::Deferred => Arc::new(DeferredPrompt),
    }
}
