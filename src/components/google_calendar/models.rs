use crate::error::{missing_field, RelayResult};
use serde::Serialize;
use serde_json::Value;

/// Query parameters of a Google Calendar `events.list` call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsQuery {
    pub time_min: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_max: Option<String>,
    pub max_results: u32,
    pub single_events: bool,
    pub order_by: String,
}

impl ListEventsQuery {
    /// Read `timeMin`/`timeMax` from a request body, falling back to `now` for the lower bound
    pub fn from_body(body: &Value, now: String, max_results: u32) -> Self {
        Self {
            time_min: text_field(body, "timeMin").unwrap_or(now),
            time_max: text_field(body, "timeMax"),
            max_results,
            single_events: true,
            order_by: "startTime".to_string(),
        }
    }
}

/// One call against the calendar provider
#[derive(Debug, Clone, PartialEq)]
pub enum CalendarOperation {
    List(ListEventsQuery),
    Insert { event: Value },
    Update { event_id: String, event: Value },
    Delete { event_id: String },
}

impl CalendarOperation {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::List(_) => "list",
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    /// Build an update, removing `eventId` from the forwarded document
    pub fn update_from_body(mut body: Value) -> RelayResult<Self> {
        let event_id = take_event_id(&mut body)?;
        Ok(Self::Update {
            event_id,
            event: body,
        })
    }

    pub fn delete_from_body(body: &Value) -> RelayResult<Self> {
        let event_id = body
            .get("eventId")
            .and_then(event_id_text)
            .ok_or_else(|| missing_field("eventId"))?;
        Ok(Self::Delete { event_id })
    }
}

/// Remove `eventId` from a request body and return it as path text
pub fn take_event_id(body: &mut Value) -> RelayResult<String> {
    body.as_object_mut()
        .and_then(|map| map.remove("eventId"))
        .as_ref()
        .and_then(event_id_text)
        .ok_or_else(|| missing_field("eventId"))
}

// Numbers and booleans are sent as their text; null and containers are not ids
fn event_id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

// Null counts as absent; other non-strings are forwarded as their JSON text
fn text_field(body: &Value, name: &str) -> Option<String> {
    match body.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
