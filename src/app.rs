// ABOUTME: Wires configuration into a running chat - router, agents, system agent, scheduler and dispatcher.
// ABOUTME: Also owns startup announcements and the graceful stop sequence.

use anyhow::{Context, Result};
use parley_agent::{BackendRegistry, ModelClient, OpenAiClient};
use parley_core::mentions::SYSTEM;
use parley_core::{
    ChatError, Config, Dispatcher, HumanOutput, Notifier, ReminderScheduler, ReminderStore,
    Router, SystemAgent,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Everything a chat session needs, built but not yet running
pub struct App {
    config: Config,
    router: Arc<Router>,
    scheduler: Arc<ReminderScheduler>,
    dispatcher: Arc<Dispatcher>,
}

/// Background tasks of a started App
pub struct Running {
    dispatcher: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

/// Model client from `[model]`, if configured
pub fn model_client(config: &Config) -> Result<Option<Arc<dyn ModelClient>>> {
    match config.model {
        Some(ref settings) => {
            if settings.api_key.is_none() {
                tracing::warn!(
                    base_url = %settings.base_url,
                    "Model configured without an API key"
                );
            }
            let client = OpenAiClient::new(settings.clone())?;
            Ok(Some(Arc::new(client)))
        }
        None => Ok(None),
    }
}

/// Announcement posted after an agent is registered
pub fn join_announcement(name: &str) -> String {
    format!("System: {name} has joined the chat. @human")
}

/// Announcement posted after an agent is removed
pub fn leave_announcement(name: &str) -> String {
    format!("System: {name} has left the chat. @human")
}

/// Unregister `name` and tell the human. Messages already addressed to it stay in the log.
pub fn remove_agent(router: &Router, name: &str) -> Result<(), ChatError> {
    if router.agents().unregister(name).is_none() {
        return Err(ChatError::UnknownRecipient(name.to_string()));
    }
    router.post(SYSTEM, &leave_announcement(name))?;
    Ok(())
}

impl App {
    /// Build the chat. Must run inside a tokio runtime, since agents are
    /// spawned as worker tasks.
    pub fn build(
        config: Config,
        human: Arc<dyn HumanOutput>,
        model: Option<Arc<dyn ModelClient>>,
        backends: &BackendRegistry,
    ) -> Result<Self> {
        let router = Arc::new(Router::new(config.chat.empty_mentions));
        router.set_log_messages(config.chat.log_messages);

        // Weak, so the scheduler does not keep the router alive
        let target = Arc::downgrade(&router);
        let notify: Notifier = Arc::new(move |text: &str| {
            if let Some(router) = target.upgrade() {
                if let Err(e) = router.post(SYSTEM, text) {
                    tracing::warn!(error = %e, "Reminder notification was not posted");
                }
            }
        });

        let tz = config.scheduler.tz()?;
        let mut scheduler = ReminderScheduler::new(notify, config.scheduler.tick_interval(), tz);
        if let Some(path) = config.scheduler.reminders_path() {
            scheduler = scheduler.with_store(ReminderStore::new(path));
        }
        let scheduler = Arc::new(scheduler);
        let restored = scheduler
            .load_from_store()
            .context("Failed to load stored reminders")?;
        if restored > 0 {
            tracing::info!(count = restored, "Restored pending reminders");
        }

        let default_recipient = config.chat.default_recipient.clone();
        if !config.overrides_default_recipient() {
            let system = SystemAgent::new(Arc::clone(&scheduler), model.clone())
                .with_instructions(config.chat.system_instructions.as_str());
            router
                .agents()
                .register(&default_recipient, system.into_handle())?;
        }

        for agent in &config.agents {
            let handle = backends
                .create_from_config(
                    &agent.name,
                    &agent.instructions,
                    model.clone(),
                    &agent.backend,
                )
                .with_context(|| {
                    format!(
                        "Failed to create agent '{}' with backend '{}'",
                        agent.name,
                        agent.backend.backend_type()
                    )
                })?;
            router.agents().register(&agent.name, handle)?;
            router.post(SYSTEM, &join_announcement(&agent.name))?;
        }

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&router),
            human,
            config.chat.poll_interval(),
        ));

        tracing::info!(
            chat = %config.chat.name,
            agents = router.agents().len(),
            default_recipient = %default_recipient,
            empty_mentions = %config.chat.empty_mentions,
            timezone = %tz,
            "Chat ready"
        );

        Ok(Self {
            config,
            router,
            scheduler,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Start the poll loop and the reminder loop
    pub fn start(&self) -> Running {
        Running {
            dispatcher: self.dispatcher.start(),
            scheduler: self.scheduler.start(),
        }
    }

    /// Stop both loops and wait until they, and every in-flight dispatch, are done
    pub async fn shutdown(&self, running: Running) {
        tracing::info!("Shutting down");
        self.dispatcher.stop();
        self.scheduler.stop();

        if let Err(e) = running.dispatcher.await {
            tracing::error!(error = %e, "Dispatch loop ended abnormally");
        }
        if let Err(e) = running.scheduler.await {
            tracing::error!(error = %e, "Reminder loop ended abnormally");
        }
        self.dispatcher.drain().await;
        tracing::info!("Shutdown complete");
    }
}
