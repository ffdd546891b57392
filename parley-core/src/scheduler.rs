// ABOUTME: Reminder scheduler - time and condition reminders evaluated on a fixed tick.
// ABOUTME: Fired reminders are handed to a callback as "REMINDER for @owner: message"; an optional markdown store mirrors time reminders.

use crate::error::ChatError;
use crate::mentions::is_valid_identifier;
use crate::metrics;
use crate::reminder_store::{reminder_id, ReminderEntry, ReminderStatus, ReminderStore};
use crate::time_expr::local_to_utc;
use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Zero-argument check for condition reminders
pub type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Receives the notification text of every fired reminder
pub type Notifier = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Time,
    Condition,
}

impl ReminderKind {
    fn label(self) -> &'static str {
        match self {
            ReminderKind::Time => "time",
            ReminderKind::Condition => "condition",
        }
    }
}

impl std::fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone)]
pub enum Trigger {
    /// Fires once when now >= the instant
    At(DateTime<Utc>),
    /// Fires on every tick the check returns true
    When { tag: String, check: Predicate },
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::At(at) => f.debug_tuple("At").field(at).finish(),
            Trigger::When { tag, .. } => f.debug_struct("When").field("tag", tag).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: String,
    pub owner: String,
    pub message: String,
    pub trigger: Trigger,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn kind(&self) -> ReminderKind {
        match self.trigger {
            Trigger::At(_) => ReminderKind::Time,
            Trigger::When { .. } => ReminderKind::Condition,
        }
    }

    /// Text handed to the notifier
    pub fn notification(&self) -> String {
        format!("REMINDER for @{}: {}", self.owner, self.message)
    }

    /// Due instant for time reminders
    pub fn due(&self) -> Option<DateTime<Utc>> {
        match self.trigger {
            Trigger::At(at) => Some(at),
            Trigger::When { .. } => None,
        }
    }

    fn should_fire(&self, now: DateTime<Utc>) -> bool {
        match &self.trigger {
            Trigger::At(at) => now >= *at,
            Trigger::When { tag, check } => {
                match catch_unwind(AssertUnwindSafe(|| check())) {
                    Ok(fire) => fire,
                    Err(_) => {
                        tracing::warn!(
                            reminder = %self.id,
                            condition = %tag,
                            "Reminder condition panicked"
                        );
                        metrics::record_error("reminder_condition_panic");
                        false
                    }
                }
            }
        }
    }
}

pub struct ReminderScheduler {
    reminders: Mutex<Vec<Reminder>>,
    notify: Notifier,
    store: Option<ReminderStore>,
    timezone: Tz,
    tick_interval: Duration,
    running: AtomicBool,
    shutdown: Notify,
    last_stamp: AtomicI64,
}

impl ReminderScheduler {
    pub fn new(notify: Notifier, tick_interval: Duration, timezone: Tz) -> Self {
        Self {
            reminders: Mutex::new(Vec::new()),
            notify,
            store: None,
            timezone,
            tick_interval,
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Mirror time reminders into a markdown file
    pub fn with_store(mut self, store: ReminderStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn store(&self) -> Option<&ReminderStore> {
        self.store.as_ref()
    }

    // Strictly increasing microsecond stamp, so ids stay unique within a process
    fn next_id(&self, owner: &str) -> String {
        let now = Utc::now().timestamp_micros();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(if now > last { now } else { last + 1 })
            })
            .unwrap_or(now);
        let stamp = if now > prev { now } else { prev + 1 };
        reminder_id(stamp, owner)
    }

    fn insert(&self, reminder: Reminder) {
        let mut reminders = self.reminders.lock().unwrap_or_else(|e| e.into_inner());
        reminders.push(reminder);
        metrics::set_active_reminders(reminders.iter().filter(|r| r.active).count());
    }

    /// Add a one-shot reminder for `owner` at `at`. Returns its id.
    pub fn add_time_reminder(
        &self,
        owner: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<String, ChatError> {
        if !is_valid_identifier(owner) {
            return Err(ChatError::InvalidAgentName(owner.to_string()));
        }
        let id = self.next_id(owner);

        if let Some(ref store) = self.store {
            let due = at.with_timezone(&self.timezone).naive_local();
            if let Err(e) = store.add(ReminderEntry::pending(&id, message, Some(due), None)) {
                tracing::warn!(reminder = %id, error = %e, "Failed to persist reminder");
                metrics::record_error("reminder_store_write");
            }
        }

        self.insert(Reminder {
            id: id.clone(),
            owner: owner.to_string(),
            message: message.to_string(),
            trigger: Trigger::At(at),
            active: true,
            created_at: Utc::now(),
        });
        metrics::record_reminder_added(ReminderKind::Time.label());
        tracing::info!(reminder = %id, owner = %owner, due = %at, "Time reminder added");
        Ok(id)
    }

    /// Add a reminder that fires whenever `check` is true. Memory-only.
    pub fn add_condition_reminder(
        &self,
        owner: &str,
        message: &str,
        tag: &str,
        check: Predicate,
    ) -> Result<String, ChatError> {
        if !is_valid_identifier(owner) {
            return Err(ChatError::InvalidAgentName(owner.to_string()));
        }
        let id = self.next_id(owner);
        self.insert(Reminder {
            id: id.clone(),
            owner: owner.to_string(),
            message: message.to_string(),
            trigger: Trigger::When {
                tag: tag.to_string(),
                check,
            },
            active: true,
            created_at: Utc::now(),
        });
        metrics::record_reminder_added(ReminderKind::Condition.label());
        tracing::info!(
            reminder = %id,
            owner = %owner,
            condition = %tag,
            "Condition reminder added"
        );
        Ok(id)
    }

    /// Deactivate `id`. Returns whether an active reminder (or a pending
    /// stored one) was found.
    pub fn cancel(&self, id: &str) -> bool {
        let found = {
            let mut reminders = self.reminders.lock().unwrap_or_else(|e| e.into_inner());
            let found = match reminders.iter_mut().find(|r| r.id == id && r.active) {
                Some(reminder) => {
                    reminder.active = false;
                    true
                }
                None => false,
            };
            metrics::set_active_reminders(reminders.iter().filter(|r| r.active).count());
            found
        };

        let stored = match self.store {
            Some(ref store) => match store.get(id) {
                Ok(Some(entry)) if entry.status == ReminderStatus::Pending => {
                    match store.set_status(id, ReminderStatus::Cancelled) {
                        Ok(changed) => changed,
                        Err(e) => {
                            tracing::warn!(
                                reminder = %id,
                                error = %e,
                                "Failed to persist cancellation"
                            );
                            false
                        }
                    }
                }
                Ok(_) => false,
                Err(e) => {
                    tracing::warn!(reminder = %id, error = %e, "Failed to read reminder store");
                    false
                }
            },
            None => false,
        };

        if found || stored {
            metrics::record_reminder_cancelled();
            tracing::info!(reminder = %id, "Reminder cancelled");
        }
        found || stored
    }

    /// Active reminders in creation order
    pub fn list(&self) -> Vec<Reminder> {
        self.reminders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.reminders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|r| r.id == id && r.active)
    }

    /// Evaluate every active reminder against the current time
    pub fn tick(&self) -> usize {
        self.tick_at(Utc::now())
    }

    /// Evaluate every active reminder against `now`. Returns how many fired.
    ///
    /// Conditions and the notifier run outside the lock, so either may call
    /// back into the scheduler.
    pub fn tick_at(&self, now: DateTime<Utc>) -> usize {
        let snapshot = self.list();

        let mut fired_time = Vec::new();
        let mut fired = 0;
        for reminder in snapshot.iter().filter(|r| r.should_fire(now)) {
            // Cancelled since the snapshot
            if !self.is_active(&reminder.id) {
                continue;
            }
            let text = reminder.notification();
            let notify = &self.notify;
            if catch_unwind(AssertUnwindSafe(|| notify(&text))).is_err() {
                tracing::error!(reminder = %reminder.id, "Reminder callback panicked");
                metrics::record_error("reminder_callback_panic");
            }
            fired += 1;
            metrics::record_reminder_fired(reminder.kind().label());
            tracing::info!(
                reminder = %reminder.id,
                owner = %reminder.owner,
                kind = %reminder.kind(),
                "Reminder fired"
            );
            if reminder.kind() == ReminderKind::Time {
                fired_time.push(reminder.id.clone());
            }
        }

        {
            let mut reminders = self.reminders.lock().unwrap_or_else(|e| e.into_inner());
            reminders.retain(|r| r.active && !fired_time.contains(&r.id));
            metrics::set_active_reminders(reminders.len());
        }

        if let Some(ref store) = self.store {
            for id in &fired_time {
                if let Err(e) = store.set_status(id, ReminderStatus::Triggered) {
                    tracing::warn!(reminder = %id, error = %e, "Failed to persist fired reminder");
                    metrics::record_error("reminder_store_write");
                }
            }
        }

        fired
    }

    /// Re-arm pending time reminders from the store. Past-due ones fire on the next tick.
    pub fn load_from_store(&self) -> Result<usize> {
        let Some(ref store) = self.store else {
            return Ok(0);
        };
        store.ensure_exists()?;

        let known: Vec<String> = self.list().into_iter().map(|r| r.id).collect();
        let mut loaded = 0;
        for entry in store.list(Some(ReminderStatus::Pending))? {
            if known.contains(&entry.id) {
                continue;
            }
            if entry.condition.is_some() {
                tracing::debug!(reminder = %entry.id, "Condition reminders are not restored");
                continue;
            }
            let (Some(owner), Some(due)) = (entry.owner(), entry.due) else {
                tracing::warn!(reminder = %entry.id, "Stored reminder has no owner or due time");
                continue;
            };
            let at = match local_to_utc(&due, self.timezone) {
                Ok(at) => at,
                Err(e) => {
                    tracing::warn!(reminder = %entry.id, error = %e, "Skipping stored reminder");
                    continue;
                }
            };
            self.insert(Reminder {
                id: entry.id.clone(),
                owner: owner.to_string(),
                message: entry.task.clone(),
                trigger: Trigger::At(at),
                active: true,
                created_at: Utc::now(),
            });
            loaded += 1;
        }

        tracing::info!(path = %store.path().display(), loaded, "Loaded pending reminders");
        Ok(loaded)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Tick on the configured interval until `stop` is called
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            interval_secs = self.tick_interval.as_secs_f64(),
            timezone = %self.timezone,
            "Starting reminder scheduler"
        );

        let mut ticker = interval(self.tick_interval);
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

        tracing::info!("Reminder scheduler stopped");
    }

    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_waiters();
    }
}
