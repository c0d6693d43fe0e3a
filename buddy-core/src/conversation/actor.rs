//! The owning task of one conversation.
//!
//! Inbound lines from the listener and local draft/submit actions are
//! queued as [`ConversationEvent`]s and applied strictly one at a time by
//! a single task. That task owns the log, the typing machine, the nudge
//! aggregate, the idle monitor and every in-flight send, so none of them
//! need locks. Dropping all handles (or sending `Shutdown`) ends the task
//! and aborts sends that are still running.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::conversation::log::{DEFAULT_MERGE_WINDOW, LogMutation, MessageLog};
use crate::conversation::message::ChatMessage;
use crate::error::BuddyError;
use crate::history::{ConversationKey, HistoryStore};
use crate::network::Outbound;
use crate::payload::{Payload, trim_blank_edge_lines};
use crate::peer::PeerEndpoint;
use crate::state::{DEFAULT_TYPING_IDLE, DEFAULT_TYPING_POLL, TypingSignal, TypingState};
use crate::task::{SendOutcome, SendTaskPool};

// ── Settings ─────────────────────────────────────────────────────

/// Timing knobs of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSettings {
    /// Incoming lines closer than this are merged into one entry.
    pub merge_window: Duration,
    /// Draft inactivity that ends a composing session.
    pub typing_idle: Duration,
    /// Idle monitor tick.
    pub typing_poll: Duration,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            merge_window: DEFAULT_MERGE_WINDOW,
            typing_idle: DEFAULT_TYPING_IDLE,
            typing_poll: DEFAULT_TYPING_POLL,
        }
    }
}

// ── Events & updates ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A line decoded by the listener.
    Inbound(Payload),
    /// The local outgoing draft now reads this.
    DraftChanged(String),
    /// Send the current draft as a chat message.
    Submit,
    /// Send this text as a chat message without going through the draft.
    /// Typing signals are only sent if a composing session is already open,
    /// and then only its stop.
    SubmitText(String),
    /// Send a nudge to the peer.
    SendNudge,
    /// Empty the log and delete its history file.
    Clear,
    Shutdown,
}

/// What observers (a UI, a test) see of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationUpdate {
    /// Log content right after history was loaded.
    Loaded(Vec<ChatMessage>),
    Log(LogMutation),
    /// An inbound nudge arrived; observers may alert the user.
    NudgeReceived,
}

// ── Handle ───────────────────────────────────────────────────────

/// Cheap, cloneable way to feed events to a running conversation.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    tx: mpsc::UnboundedSender<ConversationEvent>,
}

impl ConversationHandle {
    pub fn send(&self, event: ConversationEvent) -> Result<(), BuddyError> {
        self.tx.send(event)?;
        Ok(())
    }

    pub fn inbound(&self, payload: Payload) -> Result<(), BuddyError> {
        self.send(ConversationEvent::Inbound(payload))
    }

    pub fn set_draft(&self, draft: impl Into<String>) -> Result<(), BuddyError> {
        self.send(ConversationEvent::DraftChanged(draft.into()))
    }

    pub fn submit(&self) -> Result<(), BuddyError> {
        self.send(ConversationEvent::Submit)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), BuddyError> {
        self.send(ConversationEvent::SubmitText(text.into()))
    }

    pub fn nudge(&self) -> Result<(), BuddyError> {
        self.send(ConversationEvent::SendNudge)
    }

    pub fn clear(&self) -> Result<(), BuddyError> {
        self.send(ConversationEvent::Clear)
    }

    pub fn shutdown(&self) -> Result<(), BuddyError> {
        self.send(ConversationEvent::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Dispatch callback for [`ChatListener::start`](crate::ChatListener::start).
    ///
    /// Lines arriving after the conversation ended are dropped.
    pub fn line_handler(&self) -> impl Fn(Payload) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |payload| {
            let _ = tx.send(ConversationEvent::Inbound(payload));
        }
    }
}

// ── Conversation ─────────────────────────────────────────────────

pub struct Conversation {
    peer: PeerEndpoint,
    key: Option<ConversationKey>,
    log: MessageLog,
    typing: TypingState,
    draft: String,
    idle_monitor: Option<Interval>,
    typing_poll: Duration,
    history: HistoryStore,
    sends: SendTaskPool,
    updates: mpsc::UnboundedSender<ConversationUpdate>,
}

impl Conversation {
    /// Start the owning task for a conversation with `peer`.
    ///
    /// History is loaded first and published as [`ConversationUpdate::Loaded`].
    pub fn spawn(
        peer: PeerEndpoint,
        outbound: Arc<dyn Outbound>,
        history: HistoryStore,
        settings: ConversationSettings,
    ) -> (
        ConversationHandle,
        mpsc::UnboundedReceiver<ConversationUpdate>,
        JoinHandle<()>,
    ) {
        let (tx, events) = mpsc::unbounded_channel();
        let (updates, updates_rx) = mpsc::unbounded_channel();

        let conversation = Self {
            key: ConversationKey::for_peer(&peer),
            peer,
            log: MessageLog::with_merge_window(settings.merge_window),
            typing: TypingState::new(settings.typing_idle),
            draft: String::new(),
            idle_monitor: None,
            typing_poll: settings.typing_poll,
            history,
            sends: SendTaskPool::new(outbound),
            updates,
        };
        let task = tokio::spawn(conversation.run(events));

        (ConversationHandle { tx }, updates_rx, task)
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<ConversationEvent>) {
        info!(peer = %self.peer.name, key = ?self.key, "conversation opened");
        self.load_history().await;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ConversationEvent::Shutdown) | None => break,
                    Some(event) => self.handle(event).await,
                },
                outcome = self.sends.next_outcome() => self.on_send_outcome(outcome).await,
                _ = idle_tick(&mut self.idle_monitor) => self.on_idle_tick(),
            }
        }

        self.sends.abort_all();
        info!(peer = %self.peer.name, "conversation closed");
    }

    async fn handle(&mut self, event: ConversationEvent) {
        match event {
            ConversationEvent::Inbound(payload) => {
                let nudge = payload == Payload::Nudge;
                if let Some(mutation) = self.log.apply_inbound(payload, Utc::now()) {
                    self.commit(mutation).await;
                }
                if nudge {
                    self.publish(ConversationUpdate::NudgeReceived);
                }
            }
            ConversationEvent::DraftChanged(draft) => {
                self.draft = draft;
                self.refresh_typing();
            }
            ConversationEvent::Submit => {
                let draft = self.draft.clone();
                self.submit(&draft).await;
            }
            ConversationEvent::SubmitText(text) => self.submit(&text).await,
            ConversationEvent::SendNudge => {
                self.sends.spawn(Payload::Nudge, None);
            }
            ConversationEvent::Clear => {
                let mutation = self.history.clear(self.key.as_ref(), &mut self.log).await;
                // File is gone; publishing must not write it back.
                self.publish(ConversationUpdate::Log(mutation));
            }
            ConversationEvent::Shutdown => {}
        }
    }

    async fn submit(&mut self, raw: &str) {
        let text = trim_blank_edge_lines(raw);
        if text.is_empty() {
            return;
        }

        let (id, mutation) = self.log.push_own(text.clone(), Utc::now());
        self.commit(mutation).await;
        self.sends.spawn(Payload::Text(text), Some(id));

        // Sending clears the draft, which ends the composing session.
        self.draft.clear();
        self.refresh_typing();
    }

    async fn on_send_outcome(&mut self, outcome: SendOutcome) {
        let Some(id) = outcome.message else {
            return;
        };
        if !outcome.delivered {
            debug!(peer = %self.peer.address, message = %id, "message left undelivered");
            return;
        }
        if let Some(mutation) = self.log.set_delivered(id, true) {
            self.commit(mutation).await;
        }
    }

    // ── Typing ───────────────────────────────────────────────────

    fn refresh_typing(&mut self) {
        if let Some(signal) = self.typing.on_draft_changed(&self.draft, Instant::now()) {
            self.emit_typing(signal);
        }
    }

    fn on_idle_tick(&mut self) {
        if let Some(signal) = self.typing.poll_idle(Instant::now()) {
            self.emit_typing(signal);
        } else if !self.typing.is_composing() {
            self.idle_monitor = None;
        }
    }

    fn emit_typing(&mut self, signal: TypingSignal) {
        self.sends.spawn(signal.into(), None);
        match signal {
            TypingSignal::Start => {
                if self.idle_monitor.is_none() {
                    let period = self.typing_poll;
                    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.idle_monitor = Some(interval);
                }
            }
            TypingSignal::Stop => self.idle_monitor = None,
        }
    }

    // ── Log plumbing ─────────────────────────────────────────────

    async fn load_history(&mut self) {
        if let Some(key) = &self.key {
            let records = self.history.load(key).await;
            debug!("loaded {} history records for {key}", records.len());
            self.log.restore(records);
        }
        self.publish(ConversationUpdate::Loaded(self.log.entries().to_vec()));
    }

    /// Persist a mutation when the saved projection changed, then publish it.
    async fn commit(&mut self, mutation: LogMutation) {
        if mutation.affects_history() {
            if let Some(key) = &self.key {
                if let Err(e) = self.history.save(key, &self.log).await {
                    warn!("history save skipped: {e}");
                }
            }
        }
        self.publish(ConversationUpdate::Log(mutation));
    }

    fn publish(&self, update: ConversationUpdate) {
        // No observer left is not an error.
        let _ = self.updates.send(update);
    }
}

async fn idle_tick(monitor: &mut Option<Interval>) {
    match monitor {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────
