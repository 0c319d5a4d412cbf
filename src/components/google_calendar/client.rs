use super::models::CalendarOperation;
use super::token::Credential;
use crate::error::{config_error, Error, RelayResult};
use async_trait::async_trait;
use reqwest::{Client, Method, Request};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Performs calendar operations on behalf of a credential
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn invoke(
        &self,
        credential: &Credential,
        operation: CalendarOperation,
    ) -> RelayResult<Value>;
}

/// REST client for the Google Calendar v3 API
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    client: Client,
    base_url: Url,
    calendar_id: String,
}

impl GoogleCalendarClient {
    pub fn new(base_url: &str, calendar_id: impl Into<String>) -> RelayResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| config_error(&format!("Invalid API base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(config_error(&format!(
                "API base URL {} cannot carry a path",
                base_url
            )));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            calendar_id: calendar_id.into(),
        })
    }

    /// `{base}/calendars/{calendarId}/events[/{eventId}]` with encoded segments
    fn events_url(&self, event_id: Option<&str>) -> RelayResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| config_error("API base URL cannot carry a path"))?;
            segments
                .pop_if_empty()
                .extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }

    pub fn build_request(
        &self,
        credential: &Credential,
        operation: &CalendarOperation,
    ) -> RelayResult<Request> {
        let builder = match operation {
            CalendarOperation::List(query) => self
                .client
                .request(Method::GET, self.events_url(None)?)
                .query(query),
            CalendarOperation::Insert { event } => self
                .client
                .request(Method::POST, self.events_url(None)?)
                .json(event),
            CalendarOperation::Update { event_id, event } => self
                .client
                .request(Method::PUT, self.events_url(Some(event_id))?)
                .json(event),
            CalendarOperation::Delete { event_id } => self
                .client
                .request(Method::DELETE, self.events_url(Some(event_id))?),
        };

        Ok(builder.bearer_auth(&credential.access_token).build()?)
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn invoke(
        &self,
        credential: &Credential,
        operation: CalendarOperation,
    ) -> RelayResult<Value> {
        let request = self.build_request(credential, &operation)?;
        debug!("Calendar {} -> {} {}", operation.name(), request.method(), request.url());

        let response = self.client.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Provider {
                status: status.as_u16(),
                body,
            });
        }

        // events.delete answers 204 with no content
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }
}
