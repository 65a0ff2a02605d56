use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event identifier - random v4 UUID, unique per event
pub type EventId = Uuid;

/// Reference to the aggregate an event belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRef {
    /// Aggregate type name (e.g. "order")
    pub name: String,

    /// Aggregate instance id
    pub id: Uuid,

    /// Aggregate version after this event was applied
    pub version: u64,
}

/// A published domain event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,

    /// Event type name, used for bus routing and query filtering
    pub name: String,

    /// When the event occurred
    pub time: DateTime<Utc>,

    /// Opaque event payload
    pub data: serde_json::Value,

    /// Owning aggregate, if any
    pub aggregate: Option<AggregateRef>,
}

impl Event {
    /// Create a new event occurring now.
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            time: Utc::now(),
            data,
            aggregate: None,
        }
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    pub fn with_aggregate(mut self, name: impl Into<String>, id: Uuid, version: u64) -> Self {
        self.aggregate = Some(AggregateRef {
            name: name.into(),
            id,
            version,
        });
        self
    }

    /// Name of the owning aggregate, if any.
    pub fn aggregate_name(&self) -> Option<&str> {
        self.aggregate.as_ref().map(|a| a.name.as_str())
    }
}
