use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::FulfillmentStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: FulfillmentStatus,
    pub at: DateTime<Utc>,
    pub note: String,
}

impl TimelineEntry {
    pub fn new(status: FulfillmentStatus, at: DateTime<Utc>, note: impl Into<String>) -> Self {
        Self {
            status,
            at,
            note: note.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineError {
    #[error("timeline must contain at least one entry")]
    Empty,

    #[error("timeline entry at {attempted} precedes the previous entry at {previous}")]
    OutOfOrder {
        previous: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
}

/// Append-only status history with non-decreasing timestamps.
///
/// Never empty. Entries can only be added at the end, and deserialization
/// rejects histories that break the ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TimelineEntry>", into = "Vec<TimelineEntry>")]
pub struct StatusTimeline(Vec<TimelineEntry>);

impl StatusTimeline {
    pub fn start(first: TimelineEntry) -> Self {
        Self(vec![first])
    }

    pub fn append(&mut self, entry: TimelineEntry) -> Result<(), TimelineError> {
        if let Some(last) = self.0.last() {
            if entry.at < last.at {
                return Err(TimelineError::OutOfOrder {
                    previous: last.at,
                    attempted: entry.at,
                });
            }
        }
        self.0.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.0
    }

    pub fn latest(&self) -> &TimelineEntry {
        // Non-empty by construction.
        &self.0[self.0.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<TimelineEntry>> for StatusTimeline {
    type Error = TimelineError;

    fn try_from(entries: Vec<TimelineEntry>) -> Result<Self, Self::Error> {
        let mut iter = entries.into_iter();
        let first = iter.next().ok_or(TimelineError::Empty)?;
        let mut timeline = StatusTimeline::start(first);
        for entry in iter {
            timeline.append(entry)?;
        }
        Ok(timeline)
    }
}

impl From<StatusTimeline> for Vec<TimelineEntry> {
    fn from(value: StatusTimeline) -> Self {
        value.0
    }
}
