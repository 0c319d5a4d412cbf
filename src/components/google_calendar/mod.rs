//! Google Calendar integration: OAuth credential lifecycle and the events API.

mod actor;
mod callback;
pub mod client;
pub mod credentials;
mod handle;
pub mod models;
pub mod oauth;
pub mod prompt;
pub mod time;
pub mod token;

pub use client::{CalendarProvider, GoogleCalendarClient};
pub use credentials::{AuthConfig, CredentialManager};
pub use handle::GoogleCalendarHandle;
pub use models::{CalendarOperation, ListEventsQuery};
pub use oauth::{ClientSecret, GoogleOAuth, OAuthFlow, PendingAuthorization};
pub use prompt::{prompt_for, CodePrompt, DeferredPrompt, TerminalPrompt};
pub use token::{Credential, TokenStore};
