//! HTTP handlers and the state they share.

pub mod auth;
pub mod events;

use crate::components::google_calendar::{CalendarProvider, CredentialManager};
use chrono_tz::Tz;
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialManager>,
    pub provider: Arc<dyn CalendarProvider>,
    /// Zone used for the default lower bound of a listing
    pub timezone: Tz,
    pub max_results: u32,
}
