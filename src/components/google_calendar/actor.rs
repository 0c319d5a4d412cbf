use super::client::{CalendarProvider, GoogleCalendarClient};
use super::models::CalendarOperation;
use super::token::Credential;
use crate::error::{google_calendar_error, RelayResult};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// The Google Calendar actor that processes messages
pub struct GoogleCalendarActor {
    client: Arc<GoogleCalendarClient>,
    command_rx: mpsc::Receiver<GoogleCalendarCommand>,
}

/// Commands that can be sent to the Google Calendar actor
pub enum GoogleCalendarCommand {
    Invoke {
        credential: Credential,
        operation: CalendarOperation,
        respond_to: oneshot::Sender<RelayResult<Value>>,
    },
    Shutdown,
}

/// Handle for communicating with the Google Calendar actor
#[derive(Clone)]
pub struct GoogleCalendarActorHandle {
    command_tx: mpsc::Sender<GoogleCalendarCommand>,
}

impl GoogleCalendarActorHandle {
    /// Run one operation and wait for the provider's answer
    pub async fn invoke(
        &self,
        credential: Credential,
        operation: CalendarOperation,
    ) -> RelayResult<Value> {
        let (respond_to, response) = oneshot::channel();
        self.command_tx
            .send(GoogleCalendarCommand::Invoke {
                credential,
                operation,
                respond_to,
            })
            .await
            .map_err(|e| google_calendar_error(&format!("Actor mailbox error: {}", e)))?;

        response
            .await
            .map_err(|_| google_calendar_error("Response channel closed"))?
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> RelayResult<()> {
        let _ = self.command_tx.send(GoogleCalendarCommand::Shutdown).await;
        Ok(())
    }
}

impl GoogleCalendarActor {
    /// Create a new actor and return its handle
    pub fn new(client: GoogleCalendarClient) -> (Self, GoogleCalendarActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = Self {
            client: Arc::new(client),
            command_rx,
        };

        (actor, GoogleCalendarActorHandle { command_tx })
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Google Calendar actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                GoogleCalendarCommand::Invoke {
                    credential,
                    operation,
                    respond_to,
                } => {
                    // Each call gets its own task so a slow request does not hold up the mailbox
                    let client = Arc::clone(&self.client);
                    tokio::spawn(async move {
                        let name = operation.name();
                        let result = client.invoke(&credential, operation).await;
                        if respond_to.send(result).is_err() {
                            debug!("Caller went away before calendar {} finished", name);
                        }
                    });
                }
                GoogleCalendarCommand::Shutdown => {
                    info!("Google Calendar actor shutting down");
                    break;
                }
            }
        }

        info!("Google Calendar actor shut down");
    }
}
