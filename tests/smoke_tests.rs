use chrono::{Duration, Utc};
use gcal_relay::components::google_calendar::{Credential, TokenStore};
use gcal_relay::config::{Config, ManualAuthMode};
use gcal_relay::startup;

const CLIENT_SECRET: &str = r#"{
    "installed": {
        "client_id": "smoke.apps.googleusercontent.com",
        "client_secret": "secret",
        "redirect_uris": ["http://localhost"]
    }
}"#;

/// Smoke test to verify the defaults match the documented service settings
#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.bind_address(), "0.0.0.0:4045");
    assert_eq!(config.callback_port, 8090);
    assert_eq!(config.calendar_id, "primary");
    assert_eq!(config.max_results, 10);
    assert_eq!(config.manual_auth, ManualAuthMode::Deferred);
    assert_eq!(config.timezone, chrono_tz::Asia::Shanghai);
    assert_eq!(config.scopes.len(), 4);

    let auth = config.auth();
    assert_eq!(auth.scopes, config.scopes);
    assert_eq!(auth.callback_timeout.as_secs(), 300);
}

/// Smoke test for startup with a credential already on disk
#[tokio::test]
async fn test_warm_up_with_stored_credential() {
    let dir = tempfile::tempdir().unwrap();
    let secret_path = dir.path().join("credentials.json");
    std::fs::write(&secret_path, CLIENT_SECRET).unwrap();

    let config = Config {
        client_secret_path: secret_path,
        token_path: dir.path().join("token.json"),
        ..Config::default()
    };

    let credential = Credential {
        access_token: "ya29.smoke".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        scopes: config.scopes.clone(),
        last_refresh: Utc::now(),
    };
    TokenStore::new(&config.token_path).save(&credential).unwrap();

    let credentials = startup::credential_manager(&config, config.manual_auth).unwrap();
    startup::warm_up(&credentials).await.unwrap();

    assert!(credentials.has_valid_credential());
    assert!(credentials.pending().await.is_none());
    assert_eq!(credentials.obtain().await.unwrap(), credential);
}

/// Smoke test that a missing client secret stops startup
#[test]
fn test_missing_client_secret() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        client_secret_path: dir.path().join("absent.json"),
        ..Config::default()
    };

    assert!(startup::credential_manager(&config, ManualAuthMode::Prompt).is_err());
}
