//! Mutation notifications delivered by the push channel.

use std::fmt;

use leadcast_api_types::{LeadEventKind, LeadEventMessage, WireId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Updated => "updated",
            EventType::Deleted => "deleted",
        }
    }

    /// User-facing sentence describing what `actor_label` did.
    pub fn headline(self, actor_label: &str) -> String {
        match self {
            EventType::Created => format!("{actor_label} added a new lead."),
            EventType::Updated => format!("{actor_label} updated a lead."),
            EventType::Deleted => format!("{actor_label} deleted a lead."),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LeadEventKind> for EventType {
    fn from(kind: LeadEventKind) -> Self {
        match kind {
            LeadEventKind::Created => EventType::Created,
            LeadEventKind::Updated => EventType::Updated,
            LeadEventKind::Deleted => EventType::Deleted,
        }
    }
}

/// Identity of the user or service that performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<WireId> for ActorId {
    fn from(id: WireId) -> Self {
        Self(id.as_str().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub event_type: EventType,
    pub actor_id: ActorId,
    pub actor_label: String,
    /// Absent when the server does not say which record changed.
    pub record_id: Option<String>,
}

impl MutationEvent {
    /// Whether `local` performed this mutation.
    pub fn is_from(&self, local: &ActorId) -> bool {
        &self.actor_id == local
    }
}

impl From<LeadEventMessage> for MutationEvent {
    fn from(message: LeadEventMessage) -> Self {
        Self {
            event_type: message.event.into(),
            actor_id: message.source.into(),
            actor_label: message.source_name,
            record_id: message.lead_id.map(|id| id.as_str().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headline_names_the_actor() {
        assert_eq!(EventType::Created.headline("Ada"), "Ada added a new lead.");
        assert_eq!(EventType::Deleted.headline("Ada"), "Ada deleted a lead.");
    }

    #[test]
    fn numeric_and_textual_actor_ids_match() {
        let message = LeadEventMessage {
            event: LeadEventKind::Updated,
            source: WireId::from(12_u64),
            source_name: "Grace".into(),
            lead_id: None,
        };
        let event = MutationEvent::from(message);
        assert!(event.is_from(&ActorId::new("12")));
        assert!(!event.is_from(&ActorId::new("13")));
        assert_eq!(event.event_type, EventType::Updated);
    }
}
