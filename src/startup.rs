use crate::app::create_app;
use crate::components::google_calendar::{
    prompt_for, ClientSecret, CredentialManager, GoogleCalendarClient, GoogleCalendarHandle,
    GoogleOAuth,
};
use crate::config::{Config, ManualAuthMode};
use crate::error::{Error, RelayResult};
use crate::handlers::AppState;
use crate::shutdown;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gcal_relay=debug,tower_http=debug")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load the application config
pub fn load_config() -> miette::Result<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Build the credential manager for the given manual authorization mode
pub fn credential_manager(config: &Config, mode: ManualAuthMode) -> RelayResult<CredentialManager> {
    let auth = config.auth();
    let secret = ClientSecret::from_file(&config.client_secret_path)?;
    let flow = Arc::new(GoogleOAuth::new(secret, &auth));

    Ok(CredentialManager::new(auth, flow, prompt_for(mode)))
}

/// Obtain a credential once before serving; only a pending manual authorization is tolerated
pub async fn warm_up(credentials: &CredentialManager) -> RelayResult<()> {
    match credentials.obtain().await {
        Ok(credential) => {
            match credential.expires_at {
                Some(expires_at) => info!("Google Calendar credential valid until {}", expires_at),
                None => info!("Google Calendar credential ready"),
            }
            Ok(())
        }
        Err(Error::AuthorizationPending { url }) => {
            warn!(
                "Starting without a credential; calendar requests fail until the code for {} is submitted",
                url
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Initialize components and serve HTTP until a shutdown signal arrives
pub async fn start_server(config: Config) -> miette::Result<()> {
    let credentials = Arc::new(credential_manager(&config, config.manual_auth)?);
    warm_up(&credentials).await?;

    let client = GoogleCalendarClient::new(&config.api_base_url, config.calendar_id.clone())?;
    let calendar = GoogleCalendarHandle::new(client);

    let state = AppState {
        credentials,
        provider: Arc::new(calendar.clone()),
        timezone: config.timezone,
        max_results: config.max_results,
    };
    let app = create_app(state);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await.map_err(Error::Io)?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_signal())
        .await
        .map_err(Error::Io)?;

    if let Err(e) = calendar.shutdown().await {
        error!("Error shutting down Google Calendar actor: {:?}", e);
    }

    info!("Server stopped");
    Ok(())
}
