use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strum::IntoEnumIterator;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{listener, state::ConnectionState, sync};
use crate::config::BridgeConfig;
use crate::event::{
    BridgeEvent, ControlGate, DispatchOutcome, EventDispatcher, EventBus, EventHandler,
    EventQueue, LocalEvent, QueuedEvent, Subscription, WaitingRoomStatus,
};
use crate::participant::{LocalIdentity, ParticipantAttributes, ParticipantRoster, RenderListSink};
use crate::retry::{RetryBudget, SyncStep};
use crate::rtm::MessagingClient;
use crate::shared::BridgeError;
use crate::utils::{time_now, Uid};

/// Mutable bridge state. Never locked across an `.await`.
pub(super) struct SessionState {
    pub identity: Option<LocalIdentity>,
    pub channel: Option<String>,
    pub token: String,
    pub logged_in: bool,
    pub joined_channel: Option<String>,
    pub roster: ParticipantRoster,
    pub queue: EventQueue,
    pub initial_sync_complete: bool,
    pub has_joined: bool,
    pub waiting_room_status: WaitingRoomStatus,
    pub is_host: bool,
    pub budgets: HashMap<SyncStep, RetryBudget>,
    pub init_timestamp: Option<i64>,
}

pub(super) struct BridgeInner {
    pub client: Arc<dyn MessagingClient>,
    pub sink: Arc<dyn RenderListSink>,
    pub config: BridgeConfig,
    pub dispatcher: EventDispatcher,
    pub state_tx: watch::Sender<ConnectionState>,
    pub destroyed: AtomicBool,
    pub session: Mutex<SessionState>,
    /// Serializes the queue drain with live dispatch
    pub dispatch_lane: tokio::sync::Mutex<()>,
    pub tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BridgeInner {
    pub fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn bus(&self) -> &EventBus {
        self.dispatcher.bus()
    }

    fn new_budget(&self) -> RetryBudget {
        RetryBudget::new(self.config.initial_retry_delay, self.config.max_retry_delay)
    }

    fn reset_budget(&self, step: SyncStep) {
        let mut session = self.session();
        if let Some(budget) = session.budgets.get_mut(&step) {
            budget.reset();
        }
    }

    /// Move the connection state forward, rejecting skips and rewinds
    pub fn advance(&self, to: ConnectionState) -> Result<(), BridgeError> {
        let mut result = Ok(());
        self.state_tx.send_if_modified(|state| match state.advance_to(to) {
            Ok(next) => {
                debug!(from = %state, to = %next, "Connection state changed");
                *state = next;
                true
            }
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result
    }

    /// Spawn a task that `stop()` will abort
    pub fn spawn_tracked<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_destroyed() {
            return;
        }
        tasks.retain(|task| !task.is_finished());
        tasks.push(tokio::spawn(future));
    }

    /// Run one connection step until it succeeds, waiting the step's
    /// current delay between attempts. Only fails once destroyed.
    pub async fn retry_step<T, E, F, Fut>(&self, step: SyncStep, mut op: F) -> Result<T, BridgeError>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            if self.is_destroyed() {
                return Err(BridgeError::Destroyed);
            }

            match op().await {
                Ok(value) => {
                    self.reset_budget(step);
                    return Ok(value);
                }
                Err(e) => {
                    let delay = {
                        let mut session = self.session();
                        let fresh = self.new_budget();
                        session.budgets.entry(step).or_insert(fresh).record_failure()
                    };
                    warn!(
                        source = "rtm",
                        category = "api",
                        step = %step,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Step failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub fn gate(&self) -> ControlGate {
        let session = self.session();
        ControlGate {
            waiting_room_enabled: self.config.waiting_room_enabled,
            is_host: session.is_host,
            approved: session.waiting_room_status == WaitingRoomStatus::Approved,
        }
    }

    /// Queue the event until the initial sync completes, dispatch it otherwise
    pub async fn route(self: &Arc<Self>, event: QueuedEvent) {
        let _lane = self.dispatch_lane.lock().await;
        if self.is_destroyed() {
            return;
        }

        let live = {
            let mut session = self.session();
            if session.initial_sync_complete {
                Some(event)
            } else {
                debug!(
                    event_name = %event.payload.event_name,
                    queued = session.queue.len() + 1,
                    "Queueing event until initial sync completes"
                );
                session.queue.enqueue(event);
                None
            }
        };

        if let Some(event) = live {
            self.dispatch(event).await;
        }
    }

    /// Dispatch one event; callers must hold the dispatch lane
    pub async fn dispatch(self: &Arc<Self>, event: QueuedEvent) {
        let gate = self.gate();
        if let DispatchOutcome::Delivered(event) = self.dispatcher.dispatch(event, gate).await {
            if event.is_name_announcement() {
                self.schedule_redispatch(event);
            }
        }
    }

    /// Name announcements are delivered a second time shortly after the first
    fn schedule_redispatch(self: &Arc<Self>, event: BridgeEvent) {
        let inner = Arc::clone(self);
        let delay = self.config.name_redispatch_delay;
        self.spawn_tracked(async move {
            tokio::time::sleep(delay).await;
            if inner.is_destroyed() {
                return;
            }
            debug!(sender_uid = event.sender_uid, "Re-dispatching name announcement");
            inner.bus().emit(&event);
        });
    }
}

/// Brings the local participant online in a messaging channel and turns
/// channel traffic into ordered, exactly-once events.
///
/// Cloning is cheap; every clone controls the same session.
#[derive(Clone)]
pub struct RealtimeEventBridge {
    inner: Arc<BridgeInner>,
}

impl RealtimeEventBridge {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        sink: Arc<dyn RenderListSink>,
        config: BridgeConfig,
    ) -> Self {
        let budgets = SyncStep::iter()
            .map(|step| {
                (
                    step,
                    RetryBudget::new(config.initial_retry_delay, config.max_retry_delay),
                )
            })
            .collect();
        let dispatcher = EventDispatcher::new(EventBus::new(config.event_buffer), client.clone());
        let (state_tx, _) = watch::channel(ConnectionState::LoggedOut);

        Self {
            inner: Arc::new(BridgeInner {
                client,
                sink,
                config,
                dispatcher,
                state_tx,
                destroyed: AtomicBool::new(false),
                session: Mutex::new(SessionState {
                    identity: None,
                    channel: None,
                    token: String::new(),
                    logged_in: false,
                    joined_channel: None,
                    roster: ParticipantRoster::new(),
                    queue: EventQueue::new(),
                    initial_sync_complete: false,
                    has_joined: false,
                    waiting_room_status: WaitingRoomStatus::default(),
                    is_host: false,
                    budgets,
                    init_timestamp: None,
                }),
                dispatch_lane: tokio::sync::Mutex::new(()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Begin connecting to `channel` in the background.
    ///
    /// Calling again for the same channel does nothing. A different channel
    /// while bound, or any call after `stop()`, is ignored with a warning.
    /// Outside a tokio runtime nothing is bound and the call is ignored.
    #[instrument(skip_all, fields(uid = identity.uid))]
    pub fn start(&self, identity: LocalIdentity, channel: impl Into<String>, token: impl Into<String>) {
        let channel = channel.into();
        if self.inner.is_destroyed() {
            warn!(channel = %channel, "Ignoring start on a stopped bridge");
            return;
        }
        if let Err(e) = tokio::runtime::Handle::try_current() {
            warn!(channel = %channel, error = %e, "Ignoring start outside a tokio runtime");
            return;
        }

        {
            let mut session = self.inner.session();
            match session.channel.as_deref() {
                Some(bound) if bound == channel => {
                    debug!(channel = %channel, "Bridge already started for channel");
                    return;
                }
                Some(bound) => {
                    warn!(bound = %bound, requested = %channel, "Bridge is bound to another channel");
                    return;
                }
                None => {}
            }
            session.is_host = identity.is_host;
            session.identity = Some(identity);
            session.channel = Some(channel.clone());
            session.token = token.into();
            session.init_timestamp = Some(time_now());
        }

        info!(source = "rtm", category = "log", channel = %channel, "Starting realtime bridge");

        let notifications = self.inner.client.notifications();
        self.inner
            .spawn_tracked(listener::listen(self.inner.clone(), notifications));
        self.inner.spawn_tracked(sync::drive(self.inner.clone()));
    }

    /// Cancel all background work, leave the channel and log out.
    ///
    /// Safe to call any number of times; only the first call has an effect.
    pub async fn stop(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            debug!("Bridge already stopped");
            return;
        }

        let tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in &tasks {
            task.abort();
        }

        let (joined_channel, logged_in, dropped) = {
            let mut session = self.inner.session();
            let dropped = session.queue.len();
            session.queue.clear();
            session.has_joined = false;
            let logged_in = std::mem::take(&mut session.logged_in);
            (session.joined_channel.take(), logged_in, dropped)
        };
        self.inner.bus().clear();

        if let Err(e) = self.inner.advance(ConnectionState::Destroyed) {
            debug!(error = %e, "Bridge state already terminal");
        }
        info!(
            source = "rtm",
            category = "log",
            aborted_tasks = tasks.len(),
            dropped_events = dropped,
            "Stopping realtime bridge"
        );

        if let Some(channel) = joined_channel {
            if let Err(e) = self.inner.client.leave_channel(&channel).await {
                warn!(source = "rtm", category = "api", channel = %channel, error = %e, "Failed to leave channel");
            }
        }
        if logged_in {
            if let Err(e) = self.inner.client.logout().await {
                warn!(source = "rtm", category = "api", error = %e, "Failed to log out");
            }
        }
    }

    /// Register a closure receiving every dispatched event
    pub fn on_event<F>(&self, f: F) -> Subscription
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.inner.bus().on_event(f)
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        self.inner.bus().add_handler(handler)
    }

    /// Async stream of dispatched events.
    ///
    /// The stream holds at most `event_buffer` undelivered events. A receiver
    /// that falls further behind gets `RecvError::Lagged` and skips the oldest
    /// ones; use `on_event` or `add_handler` when every event must be seen.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.bus().subscribe()
    }

    pub fn subscribe_local_events(&self) -> broadcast::Receiver<LocalEvent> {
        self.inner.bus().subscribe_local()
    }

    pub fn get_participant(&self, uid: Uid) -> Option<ParticipantAttributes> {
        self.inner.session().roster.get(uid).cloned()
    }

    pub fn online_users_count(&self) -> usize {
        self.inner.session().roster.online_count()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the bridge is `Ready`; false if it was stopped first
    pub async fn ready(&self) -> bool {
        let mut state = self.inner.state_tx.subscribe();
        let ready = match state
            .wait_for(|s| matches!(s, ConnectionState::Ready | ConnectionState::Destroyed))
            .await
        {
            Ok(state) => *state == ConnectionState::Ready,
            Err(_) => false,
        };
        ready
    }

    pub fn has_joined(&self) -> bool {
        self.inner.session().has_joined
    }

    /// True once every event queued before `Ready` has been dispatched
    pub fn initial_sync_complete(&self) -> bool {
        self.inner.session().initial_sync_complete
    }

    pub fn init_timestamp(&self) -> Option<i64> {
        self.inner.session().init_timestamp
    }

    pub fn queued_events(&self) -> usize {
        self.inner.session().queue.len()
    }

    pub fn retry_budget(&self, step: SyncStep) -> RetryBudget {
        let session = self.inner.session();
        session
            .budgets
            .get(&step)
            .copied()
            .unwrap_or_else(|| self.inner.new_budget())
    }

    pub fn set_host(&self, is_host: bool) {
        self.inner.session().is_host = is_host;
    }

    pub fn waiting_room_status(&self) -> WaitingRoomStatus {
        self.inner.session().waiting_room_status
    }

    pub fn set_waiting_room_status(&self, status: WaitingRoomStatus) {
        debug!(status = ?status, "Waiting room status changed");
        self.inner.session().waiting_room_status = status;
    }
}
