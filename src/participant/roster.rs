use std::collections::BTreeMap;
use tracing::debug;

use super::models::{ParticipantAttributes, ParticipantKind};
use crate::utils::Uid;

/// Per-participant attribute cache
///
/// Entries are never removed; a participant that leaves is kept offline so
/// a reconnect finds its history.
#[derive(Debug, Default)]
pub struct ParticipantRoster {
    entries: BTreeMap<Uid, ParticipantAttributes>,
}

impl ParticipantRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a participant, returns true if it was new
    pub fn upsert(&mut self, participant: ParticipantAttributes) -> bool {
        match self.entries.get_mut(&participant.uid) {
            Some(existing) => {
                let last_message_timestamp = existing
                    .last_message_timestamp
                    .max(participant.last_message_timestamp);
                *existing = ParticipantAttributes {
                    last_message_timestamp,
                    ..participant
                };
                debug!(uid = existing.uid, "Participant refreshed");
                false
            }
            None => {
                debug!(uid = participant.uid, "Participant added");
                self.entries.insert(participant.uid, participant);
                true
            }
        }
    }

    /// Mark a participant offline, returns false if it was never seen
    pub fn mark_offline(&mut self, uid: Uid) -> bool {
        match self.entries.get_mut(&uid) {
            Some(existing) => {
                existing.online = false;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, uid: Uid) -> Option<&ParticipantAttributes> {
        self.entries.get(&uid)
    }

    /// Media participants currently online (bots excluded)
    pub fn online_count(&self) -> usize {
        self.entries
            .values()
            .filter(|p| p.online && p.kind == ParticipantKind::Rtc)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
