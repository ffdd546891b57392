// ABOUTME: Idle-poll dispatcher - on every tick, hands each idle agent its unread messages.
// ABOUTME: Dispatches run as detached tasks; replies are posted back and inputs are always marked read.

use crate::error::ChatError;
use crate::mentions::HUMAN;
use crate::metrics;
use crate::router::Router;
use crate::traits::HumanOutput;
use parley_agent::{AgentHandle, BusyGuard, MessageRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};

/// What `dispatch_agent` did for one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No agent by that name; nothing was marked read
    Unregistered,
    /// A previous dispatch is still running
    Busy,
    NothingUnread,
    /// A dispatch task was started with this many records
    Dispatched(usize),
}

/// Summary of one poll tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Records rendered to the human
    pub human_delivered: usize,
    /// Agents a dispatch was started for, sorted
    pub dispatched: Vec<String>,
}

pub struct Dispatcher {
    router: Arc<Router>,
    human: Arc<dyn HumanOutput>,
    poll_interval: Duration,
    running: AtomicBool,
    shutdown: Notify,
    inflight: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>, human: Arc<dyn HumanOutput>, poll_interval: Duration) -> Self {
        Self {
            router,
            human,
            poll_interval,
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
            inflight: Mutex::new(JoinSet::new()),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one poll: render the human's unread messages, then start a
    /// dispatch for every idle agent with unread messages.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let for_human = self.router.unread(HUMAN);
        if !for_human.is_empty() {
            self.human.deliver(&for_human);
            self.router.mark_read(HUMAN, &for_human);
            report.human_delivered = for_human.len();
        }

        for (id, handle) in self.router.agents().snapshot() {
            if let DispatchOutcome::Dispatched(_) = self.dispatch_to(&id, handle) {
                report.dispatched.push(id);
            }
        }

        self.reap_finished();
        report
    }

    /// Start a dispatch for `id` if it is registered, idle and has unread messages
    pub fn dispatch_agent(&self, id: &str) -> DispatchOutcome {
        match self.router.agents().get(id) {
            Some(handle) => self.dispatch_to(id, handle),
            None => {
                let err = ChatError::UnknownRecipient(id.to_string());
                tracing::debug!(error = %err, "Dispatch target not registered");
                DispatchOutcome::Unregistered
            }
        }
    }

    fn dispatch_to(&self, id: &str, handle: AgentHandle) -> DispatchOutcome {
        let Some(guard) = handle.try_acquire() else {
            return DispatchOutcome::Busy;
        };

        // An agent never answers its own messages
        let (own, records): (Vec<_>, Vec<_>) = self
            .router
            .unread(id)
            .into_iter()
            .partition(|record| record.sender == id);
        if !own.is_empty() {
            tracing::debug!(agent = %id, count = own.len(), "Skipping self-sent messages");
            self.router.mark_read(id, &own);
        }
        if records.is_empty() {
            return DispatchOutcome::NothingUnread;
        }

        let count = records.len();
        tracing::debug!(agent = %id, count, "Dispatching unread messages");
        metrics::record_dispatch(id);

        let router = Arc::clone(&self.router);
        let id = id.to_string();
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .spawn(run_dispatch(router, id, handle, records, guard));

        DispatchOutcome::Dispatched(count)
    }

    fn reap_finished(&self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(result) = inflight.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "Dispatch task panicked");
                metrics::record_error("dispatch_panic");
            }
        }
    }

    /// Number of dispatch tasks not yet reaped
    pub fn inflight(&self) -> usize {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Poll on a fixed interval until `stop` is called
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "Starting dispatch loop"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.is_running() {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.notified() => break,
            }
            if !self.is_running() {
                break;
            }
            self.tick();
        }

        tracing::info!("Dispatch loop stopped");
    }

    /// Spawn `run` on the current runtime
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Suppress further ticks. In-flight dispatches keep running; see `drain`.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_waiters();
    }

    /// Wait for every in-flight dispatch to finish
    pub async fn drain(&self) {
        let mut inflight =
            std::mem::take(&mut *self.inflight.lock().unwrap_or_else(|e| e.into_inner()));
        while let Some(result) = inflight.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Dispatch task panicked");
            }
        }
    }
}

async fn run_dispatch(
    router: Arc<Router>,
    id: String,
    handle: AgentHandle,
    records: Vec<MessageRecord>,
    guard: BusyGuard,
) {
    let result = match handle.respond(&id, records.clone()).await {
        Ok(receiver) => receiver.into_response().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(Some(reply)) => {
            if let Err(e) = router.post(&id, &reply) {
                tracing::warn!(agent = %id, error = %e, "Agent reply was not accepted");
            }
        }
        Ok(None) => tracing::debug!(agent = %id, "Agent chose not to reply"),
        Err(e) => {
            let failure = ChatError::AgentDispatchFailure {
                agent: id.clone(),
                reason: format!("{e:#}"),
            };
            tracing::warn!(error = %failure, "Dispatch failed");
            metrics::record_dispatch_failure(&id);
        }
    }

    // Read even on failure so a crashing agent does not replay the same batch
    router.mark_read(&id, &records);
    drop(guard);
}
