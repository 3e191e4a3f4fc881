#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use rtm_bridge::{
    participant::ParticipantUpdate, BridgeEvent, EventHandler, RenderListAction, RenderListSink,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Render-list sink that keeps every action it receives
#[derive(Clone, Default)]
pub struct RecordingSink {
    actions: Arc<Mutex<Vec<(Instant, RenderListAction)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<RenderListAction> {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, action)| action.clone())
            .collect()
    }

    pub fn updates_for(&self, uid: u32) -> Vec<(Instant, ParticipantUpdate)> {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(at, action)| match action {
                RenderListAction::UpdateRenderList { uid: target, update } if *target == uid => {
                    Some((*at, update.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn last_update_for(&self, uid: u32) -> Option<ParticipantUpdate> {
        self.updates_for(uid).pop().map(|(_, update)| update)
    }

    pub fn first_update_at(&self, uid: u32) -> Option<Instant> {
        self.updates_for(uid).first().map(|(at, _)| *at)
    }
}

impl RenderListSink for RecordingSink {
    fn dispatch(&self, action: RenderListAction) {
        self.actions.lock().unwrap().push((Instant::now(), action));
    }
}

/// Event subscriber that remembers what it saw and when
#[derive(Clone, Default)]
pub struct RecordingSubscriber {
    events: Arc<Mutex<Vec<(Instant, BridgeEvent)>>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BridgeEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.event_name)
            .collect()
    }

    pub fn named(&self, name: &str) -> Vec<(Instant, BridgeEvent)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| event.event_name == name)
            .cloned()
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.named(name).len()
    }
}

impl EventHandler for RecordingSubscriber {
    fn handle(&self, event: &BridgeEvent) {
        self.events
            .lock()
            .unwrap()
            .push((Instant::now(), event.clone()));
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
