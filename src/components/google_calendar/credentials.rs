//! Credential lifecycle for the single configured Google account.
//!
//! [`CredentialManager::obtain`] returns a usable credential, trying in order:
//! the persisted token, one refresh of an expired token, the browser flow with
//! a loopback redirect, and finally manual authorization. Every new or
//! refreshed credential is written back to the token file.

use super::oauth::{OAuthFlow, PendingAuthorization};
use super::prompt::CodePrompt;
use super::token::{Credential, TokenStore};
use crate::error::{authorization_error, missing_field, Error, RelayResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Settings for the credential lifecycle
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Where the credential is persisted
    pub token_path: PathBuf,
    /// Scopes a credential must carry to be used
    pub scopes: Vec<String>,
    /// Loopback port for the browser flow
    pub callback_port: u16,
    /// How long the browser flow waits for the redirect
    pub callback_timeout: Duration,
    /// Redirect URI used by manual authorization
    pub manual_redirect_uri: String,
}

pub struct CredentialManager {
    config: AuthConfig,
    store: TokenStore,
    flow: Arc<dyn OAuthFlow>,
    prompt: Arc<dyn CodePrompt>,
    /// Serializes refreshes and authorizations within the process
    lifecycle: Mutex<()>,
    pending: Mutex<Option<PendingAuthorization>>,
}

impl CredentialManager {
    pub fn new(config: AuthConfig, flow: Arc<dyn OAuthFlow>, prompt: Arc<dyn CodePrompt>) -> Self {
        let store = TokenStore::new(config.token_path.clone());
        Self {
            config,
            store,
            flow,
            prompt,
            lifecycle: Mutex::new(()),
            pending: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Produce a non-expired credential carrying the configured scopes
    pub async fn obtain(&self) -> RelayResult<Credential> {
        let _guard = self.lifecycle.lock().await;

        let stored = self.load_stored();
        if let Some(credential) = stored.as_ref().filter(|c| self.is_usable(c)) {
            if self.pending.lock().await.take().is_some() {
                info!("Valid credential found on disk, dropping pending authorization");
            }
            return Ok(credential.clone());
        }

        if let Some(credential) = stored {
            if !credential.has_scopes(&self.config.scopes) {
                info!("Stored credential lacks required scopes, re-authorizing");
            } else if credential.can_refresh() {
                info!("Credential expired, refreshing");
                match self.flow.refresh(&credential).await {
                    Ok(refreshed) => {
                        self.store.save(&refreshed)?;
                        if self.pending.lock().await.take().is_some() {
                            info!("Refresh succeeded, dropping pending authorization");
                        }
                        return Ok(refreshed);
                    }
                    Err(e) => {
                        warn!("Token refresh failed, falling back to authorization: {}", e);
                    }
                }
            } else {
                info!("Credential expired and cannot be refreshed, re-authorizing");
            }
        }

        // The operator has to submit the code before another consent is started
        if let Some(pending) = self.pending.lock().await.as_ref() {
            return Err(Error::AuthorizationPending {
                url: pending.url.clone(),
            });
        }

        let credential = self.authorize().await?;
        self.store.save(&credential)?;
        Ok(credential)
    }

    /// Complete a pending manual authorization with the code the operator copied
    pub async fn submit_code(&self, state: Option<&str>, code: &str) -> RelayResult<Credential> {
        let _guard = self.lifecycle.lock().await;
        let mut pending = self.pending.lock().await;

        let current = pending
            .as_ref()
            .ok_or_else(|| authorization_error("No authorization is pending"))?;

        if let Some(state) = state {
            if state != current.state {
                return Err(authorization_error(
                    "Authorization state does not match the pending request",
                ));
            }
        }

        let code = code.trim();
        if code.is_empty() {
            return Err(missing_field("code"));
        }

        let credential = self
            .flow
            .exchange_manual_code(code, &self.config.scopes)
            .await?;
        self.store.save(&credential)?;
        *pending = None;

        info!("Manual authorization completed");
        Ok(credential)
    }

    /// The manual authorization currently waiting for a code, if any
    pub async fn pending(&self) -> Option<PendingAuthorization> {
        self.pending.lock().await.clone()
    }

    /// Whether a usable credential is on disk right now
    pub fn has_valid_credential(&self) -> bool {
        self.load_stored()
            .as_ref()
            .is_some_and(|c| self.is_usable(c))
    }

    fn is_usable(&self, credential: &Credential) -> bool {
        !credential.is_expired() && credential.has_scopes(&self.config.scopes)
    }

    fn load_stored(&self) -> Option<Credential> {
        match self.store.load() {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Ignoring unreadable credential: {}", e);
                None
            }
        }
    }

    async fn authorize(&self) -> RelayResult<Credential> {
        let scopes = &self.config.scopes;

        match self.flow.authorize_local(scopes).await {
            Ok(credential) => return Ok(credential),
            Err(e) => {
                error!("Local server authorization failed: {}", e);
                info!("Switching to manual authorization...");
            }
        }

        let pending = self.flow.manual_authorization(scopes)?;
        match self.prompt.request_code(&pending).await? {
            Some(code) => self.flow.exchange_manual_code(&code, scopes).await,
            None => {
                let url = pending.url.clone();
                *self.pending.lock().await = Some(pending);
                Err(Error::AuthorizationPending { url })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::google_calendar::prompt::DeferredPrompt;
    use crate::error::other_error;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

    fn credential(token: &str, expired: bool, refresh: Option<&str>) -> Credential {
        let offset = if expired {
            -ChronoDuration::hours(1)
        } else {
            ChronoDuration::hours(1)
        };
        Credential {
            access_token: token.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Some(Utc::now() + offset),
            scopes: vec![SCOPE.to_string()],
            last_refresh: Utc::now(),
        }
    }

    #[derive(Default)]
    struct MockFlow {
        refresh_result: Option<Credential>,
        /// Refresh attempts that fail before `refresh_result` is returned
        refresh_failures: usize,
        local_result: Option<Credential>,
        manual_result: Option<Credential>,
        refresh_calls: AtomicUsize,
        local_calls: AtomicUsize,
        manual_calls: AtomicUsize,
    }

    #[async_trait]
    impl OAuthFlow for MockFlow {
        async fn refresh(&self, _credential: &Credential) -> RelayResult<Credential> {
            let attempt = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if attempt < self.refresh_failures {
                return Err(other_error("token endpoint unreachable"));
            }
            self.refresh_result
                .clone()
                .ok_or_else(|| other_error("refresh rejected"))
        }

        async fn authorize_local(&self, _scopes: &[String]) -> RelayResult<Credential> {
            self.local_calls.fetch_add(1, Ordering::SeqCst);
            self.local_result
                .clone()
                .ok_or_else(|| other_error("no browser"))
        }

        fn manual_authorization(&self, _scopes: &[String]) -> RelayResult<PendingAuthorization> {
            Ok(PendingAuthorization {
                url: "https://accounts.google.com/o/oauth2/auth?state=manual".to_string(),
                state: "manual".to_string(),
                created_at: Utc::now(),
            })
        }

        async fn exchange_manual_code(
            &self,
            code: &str,
            _scopes: &[String],
        ) -> RelayResult<Credential> {
            self.manual_calls.fetch_add(1, Ordering::SeqCst);
            if code != "good-code" {
                return Err(authorization_error("invalid_grant"));
            }
            self.manual_result
                .clone()
                .ok_or_else(|| other_error("exchange failed"))
        }
    }

    struct FixedPrompt(&'static str);

    #[async_trait]
    impl CodePrompt for FixedPrompt {
        async fn request_code(
            &self,
            _pending: &PendingAuthorization,
        ) -> RelayResult<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        flow: Arc<MockFlow>,
        manager: CredentialManager,
    }

    fn fixture(flow: MockFlow, prompt: Arc<dyn CodePrompt>, stored: Option<&Credential>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = AuthConfig {
            token_path: dir.path().join("token.json"),
            scopes: vec![SCOPE.to_string()],
            callback_port: 8090,
            callback_timeout: Duration::from_secs(1),
            manual_redirect_uri: "urn:ietf:wg:oauth:2.0:oob".to_string(),
        };
        if let Some(credential) = stored {
            TokenStore::new(config.token_path.clone())
                .save(credential)
                .unwrap();
        }

        let flow = Arc::new(flow);
        let manager = CredentialManager::new(config, flow.clone(), prompt);
        Fixture {
            _dir: dir,
            flow,
            manager,
        }
    }

    #[tokio::test]
    async fn valid_credential_skips_every_flow() {
        let stored = credential("stored", false, Some("rt"));
        let f = fixture(MockFlow::default(), Arc::new(DeferredPrompt), Some(&stored));

        let obtained = f.manager.obtain().await.unwrap();

        assert_eq!(obtained, stored);
        assert_eq!(f.flow.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 0);
        assert!(f.manager.has_valid_credential());
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_and_persisted() {
        let stored = credential("stale", true, Some("rt"));
        let refreshed = credential("fresh", false, Some("rt"));
        let flow = MockFlow {
            refresh_result: Some(refreshed.clone()),
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(DeferredPrompt), Some(&stored));

        let obtained = f.manager.obtain().await.unwrap();

        assert_eq!(obtained, refreshed);
        assert_eq!(f.flow.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.manager.store().load().unwrap(), Some(refreshed));
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_authorization_once() {
        let stored = credential("stale", true, Some("rt"));
        let authorized = credential("browser", false, Some("rt2"));
        let flow = MockFlow {
            local_result: Some(authorized.clone()),
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(DeferredPrompt), Some(&stored));

        let obtained = f.manager.obtain().await.unwrap();

        assert_eq!(obtained, authorized);
        assert_eq!(f.flow.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.manager.store().load().unwrap(), Some(authorized));
    }

    #[tokio::test]
    async fn refresh_is_retried_while_authorization_is_pending() {
        let stored = credential("stale", true, Some("rt"));
        let refreshed = credential("fresh", false, Some("rt"));
        let flow = MockFlow {
            refresh_result: Some(refreshed.clone()),
            refresh_failures: 1,
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(DeferredPrompt), Some(&stored));

        assert!(matches!(
            f.manager.obtain().await,
            Err(Error::AuthorizationPending { .. })
        ));
        assert!(f.manager.pending().await.is_some());

        let obtained = f.manager.obtain().await.unwrap();

        assert_eq!(obtained, refreshed);
        assert_eq!(f.flow.refresh_calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 1);
        assert!(f.manager.pending().await.is_none());
        assert_eq!(f.manager.store().load().unwrap(), Some(refreshed));
    }

    #[tokio::test]
    async fn failed_refresh_while_pending_does_not_restart_consent() {
        let stored = credential("stale", true, Some("rt"));
        let flow = MockFlow {
            refresh_failures: usize::MAX,
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(DeferredPrompt), Some(&stored));

        for _ in 0..3 {
            assert!(matches!(
                f.manager.obtain().await,
                Err(Error::AuthorizationPending { .. })
            ));
        }

        assert_eq!(f.flow.refresh_calls.load(Ordering::SeqCst), 3);
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_goes_to_authorization() {
        let stored = credential("stale", true, None);
        let authorized = credential("browser", false, Some("rt"));
        let flow = MockFlow {
            local_result: Some(authorized.clone()),
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(DeferredPrompt), Some(&stored));

        assert_eq!(f.manager.obtain().await.unwrap(), authorized);
        assert_eq!(f.flow.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_scopes_force_authorization() {
        let mut stored = credential("narrow", false, Some("rt"));
        stored.scopes = vec!["https://www.googleapis.com/auth/calendar.readonly".to_string()];
        let authorized = credential("browser", false, Some("rt"));
        let flow = MockFlow {
            local_result: Some(authorized.clone()),
            refresh_result: Some(credential("refreshed", false, Some("rt"))),
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(DeferredPrompt), Some(&stored));

        assert_eq!(f.manager.obtain().await.unwrap(), authorized);
        assert_eq!(f.flow.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prompt_code_is_exchanged_when_browser_flow_fails() {
        let manual = credential("manual", false, Some("rt"));
        let flow = MockFlow {
            manual_result: Some(manual.clone()),
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(FixedPrompt("good-code")), None);

        assert_eq!(f.manager.obtain().await.unwrap(), manual);
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.flow.manual_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.manager.store().load().unwrap(), Some(manual));
    }

    #[tokio::test]
    async fn rejected_prompt_code_is_fatal() {
        let f = fixture(MockFlow::default(), Arc::new(FixedPrompt("bad-code")), None);

        assert!(matches!(
            f.manager.obtain().await,
            Err(Error::Authorization(_))
        ));
        assert!(f.manager.store().load().unwrap().is_none());
    }

    #[tokio::test]
    async fn deferred_authorization_resumes_with_submitted_code() {
        let manual = credential("manual", false, Some("rt"));
        let flow = MockFlow {
            manual_result: Some(manual.clone()),
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(DeferredPrompt), None);

        assert!(matches!(
            f.manager.obtain().await,
            Err(Error::AuthorizationPending { .. })
        ));
        let pending = f.manager.pending().await.unwrap();
        assert_eq!(pending.state, "manual");

        // A second request does not restart the browser flow
        assert!(matches!(
            f.manager.obtain().await,
            Err(Error::AuthorizationPending { .. })
        ));
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 1);

        assert!(f
            .manager
            .submit_code(Some("other-state"), "good-code")
            .await
            .is_err());

        let submitted = f
            .manager
            .submit_code(Some("manual"), "good-code")
            .await
            .unwrap();
        assert_eq!(submitted, manual);
        assert!(f.manager.pending().await.is_none());

        assert_eq!(f.manager.obtain().await.unwrap(), manual);
        assert_eq!(f.flow.local_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_without_pending_authorization_fails() {
        let f = fixture(MockFlow::default(), Arc::new(DeferredPrompt), None);
        assert!(f.manager.submit_code(None, "good-code").await.is_err());
    }

    #[tokio::test]
    async fn corrupt_token_file_is_treated_as_missing() {
        let authorized = credential("browser", false, Some("rt"));
        let flow = MockFlow {
            local_result: Some(authorized.clone()),
            ..Default::default()
        };
        let f = fixture(flow, Arc::new(DeferredPrompt), None);
        std::fs::write(f.manager.store().path(), "{ not json").unwrap();

        assert_eq!(f.manager.obtain().await.unwrap(), authorized);
        assert_eq!(f.manager.store().load().unwrap(), Some(authorized));
    }
}
