use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// Envelope for a published event: identity and routing metadata around a payload.
///
/// `subject_id` is the document the event is about (an order id, for instance)
/// and `subject_type` its collection name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,

    subject_id: Uuid,
    subject_type: String,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_at: DateTime<Utc>,
        subject_id: Uuid,
        subject_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            event_version,
            occurred_at,
            subject_id,
            subject_type: subject_type.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Wrap a typed event as a JSON envelope, capturing its metadata.
    pub fn from_typed<E>(
        subject_id: Uuid,
        subject_type: impl Into<String>,
        event: &E,
    ) -> Result<Self, serde_json::Error>
    where
        E: Event + Serialize,
    {
        Ok(Self::new(
            Uuid::now_v7(),
            event.event_type(),
            event.version(),
            event.occurred_at(),
            subject_id,
            subject_type,
            serde_json::to_value(event)?,
        ))
    }
}
