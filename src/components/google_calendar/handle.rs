use super::actor::{GoogleCalendarActor, GoogleCalendarActorHandle};
use super::client::{CalendarProvider, GoogleCalendarClient};
use super::models::CalendarOperation;
use super::token::Credential;
use crate::error::RelayResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Handle for interacting with the Google Calendar actor
#[derive(Clone)]
pub struct GoogleCalendarHandle {
    actor_handle: GoogleCalendarActorHandle,
    _actor_task: Arc<JoinHandle<()>>,
}

impl GoogleCalendarHandle {
    /// Create a new GoogleCalendarHandle and spawn the actor
    pub fn new(client: GoogleCalendarClient) -> Self {
        let (mut actor, handle) = GoogleCalendarActor::new(client);

        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_handle: handle,
            _actor_task: Arc::new(actor_task),
        }
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> RelayResult<()> {
        self.actor_handle.shutdown().await
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarHandle {
    async fn invoke(
        &self,
        credential: &Credential,
        operation: CalendarOperation,
    ) -> RelayResult<Value> {
        self.actor_handle
            .invoke(credential.clone(), operation)
            .await
    }
}
