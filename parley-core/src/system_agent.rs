// ABOUTME: Built-in `system` agent - sets and cancels reminders from chat and answers everything else.
// ABOUTME: Recognizes "remind ..." and "cancel reminder <id>" itself; falls back to the model or a help text.

use crate::error::ChatError;
use crate::mentions::{parse_mentions, strip_mention, SYSTEM};
use crate::scheduler::ReminderScheduler;
use crate::time_expr::{format_local, parse_due};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use once_cell::sync::Lazy;
use parley_agent::{
    complete_json_or, AgentBackend, AgentEvent, AgentHandle, MessageRecord, ModelClient,
    ModelRequest,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

static REMIND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^remind\s+@?(\w+)\s+(.+?):\s+(.+)$").expect("valid remind regex")
});

static CANCEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^cancel\s+reminder\s+(\S+)$").expect("valid cancel regex")
});

const EXTRACT_PROMPT: &str = "You turn chat requests into reminders. Reply with a JSON object \
     with the keys \"owner\" (who should be reminded, a single word, or \"me\" for the \
     person asking), \"message\" (what to remind them of) and \"due\" (when, written \
     like \"in 10 minutes\" or \"YYYY-MM-DD HH:MM\"). Use null for anything you cannot tell.";

const DEFAULT_INSTRUCTIONS: &str = "You are the system assistant of a group chat. \
     Answer briefly and helpfully.";

/// What the model extracted from a free-form reminder request
#[derive(Debug, Default, Deserialize)]
struct ExtractedReminder {
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    due: Option<String>,
}

pub struct SystemAgent {
    scheduler: Arc<ReminderScheduler>,
    model: Option<Arc<dyn ModelClient>>,
    instructions: String,
}

impl SystemAgent {
    pub fn new(scheduler: Arc<ReminderScheduler>, model: Option<Arc<dyn ModelClient>>) -> Self {
        Self {
            scheduler,
            model,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    /// Replace the instructions used for plain chat replies
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        if !instructions.trim().is_empty() {
            self.instructions = instructions;
        }
        self
    }

    pub fn into_handle(self) -> AgentHandle {
        AgentHandle::spawn(self)
    }

    /// Answer one record delivered to `agent_id`. A reply always starts
    /// with a mention of the sender.
    ///
    /// Returns None for records the agent sent itself, and for records that
    /// mention somebody else but not `agent_id` unless they are a reminder
    /// command.
    pub async fn handle(&self, agent_id: &str, record: &MessageRecord) -> Option<String> {
        let sender = record.sender.as_str();
        if sender == agent_id {
            return None;
        }

        let text = strip_mention(&record.body, agent_id);
        let text = text.trim();

        if let Some(caps) = REMIND_RE.captures(text) {
            let owner = resolve_owner(&caps[1], sender);
            return Some(self.set_reminder(sender, owner, caps[2].trim(), caps[3].trim()));
        }

        if let Some(caps) = CANCEL_RE.captures(text) {
            let id = &caps[1];
            return Some(if self.scheduler.cancel(id) {
                format!("@{sender} Cancelled reminder {id}.")
            } else {
                format!("@{sender} No active reminder {id}.")
            });
        }

        let mentions = parse_mentions(&record.body);
        if !mentions.is_empty() && !mentions.contains(agent_id) {
            tracing::trace!(agent = %agent_id, sender = %sender, "Overheard message ignored");
            return None;
        }

        Some(match self.model {
            Some(ref model) if text.to_lowercase().contains("remind") => {
                self.extract_reminder(model.as_ref(), sender, text).await
            }
            Some(ref model) => self.chat(model.as_ref(), sender, text).await,
            None => format!("@{sender} {}", usage()),
        })
    }

    fn set_reminder(&self, sender: &str, owner: &str, when: &str, message: &str) -> String {
        let tz = self.scheduler.timezone();
        let due = match parse_due(when, tz) {
            Ok(due) => due,
            Err(e) => return format!("@{sender} {e}"),
        };
        match self.scheduler.add_time_reminder(owner, message, due) {
            Ok(id) => format!(
                "@{sender} Reminder {id} set for {owner} at {} ({tz}).",
                format_local(due, tz)
            ),
            Err(e) => format!("@{sender} {e}"),
        }
    }

    async fn extract_reminder(
        &self,
        model: &dyn ModelClient,
        sender: &str,
        text: &str,
    ) -> String {
        let request = ModelRequest::new(EXTRACT_PROMPT, format!("{sender}: {text}"))
            .with_temperature(0.0);
        let extracted = complete_json_or(model, request, ExtractedReminder::default()).await;

        match extracted {
            ExtractedReminder {
                owner: Some(owner),
                message: Some(message),
                due: Some(due),
            } => {
                let owner = resolve_owner(owner.trim_start_matches('@'), sender);
                self.set_reminder(sender, owner, &due, &message)
            }
            _ => {
                tracing::debug!(sender = %sender, "Could not extract a reminder");
                format!(
                    "@{sender} Sorry, I could not understand that reminder. \
                     Try: remind me in 10 minutes: stretch"
                )
            }
        }
    }

    async fn chat(&self, model: &dyn ModelClient, sender: &str, text: &str) -> String {
        let request = ModelRequest::new(self.instructions.as_str(), format!("{sender}: {text}"));
        match model.complete(&request).await {
            Ok(reply) if !reply.trim().is_empty() => {
                let reply = strip_mention(&reply, sender);
                format!("@{sender} {reply}")
            }
            Ok(_) => format!("@{sender} {}", usage()),
            Err(e) => {
                let err = ChatError::UpstreamModelError(e.to_string());
                tracing::warn!(sender = %sender, error = %err, "System agent falling back");
                format!("@{sender} Sorry, I cannot answer that right now.")
            }
        }
    }
}

fn resolve_owner<'a>(owner: &'a str, sender: &'a str) -> &'a str {
    if owner.eq_ignore_ascii_case("me") {
        sender
    } else {
        owner
    }
}

fn usage() -> &'static str {
    "I can set reminders. Try: \"remind me in 10 minutes: stretch\", \
     \"remind alice 2030-01-31 09:00: send the report\" or \"cancel reminder <id>\"."
}

impl AgentBackend for SystemAgent {
    fn name(&self) -> &'static str {
        SYSTEM
    }

    fn respond<'a>(
        &'a mut self,
        agent_id: &'a str,
        records: &'a [MessageRecord],
    ) -> BoxFuture<'a, Result<BoxStream<'a, AgentEvent>>> {
        Box::pin(async move {
            let mut replies = Vec::with_capacity(records.len());
            for record in records {
                if let Some(reply) = self.handle(agent_id, record).await {
                    replies.push(reply);
                }
            }
            tracing::debug!(agent = %agent_id, count = replies.len(), "System agent answered");

            let event = AgentEvent::Result {
                text: replies.join("\n"),
                usage: None,
            };
            Ok(stream::once(async move { event }).boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Notifier;
    use chrono::Utc;
    use parley_agent::testing::ScriptedModel;
    use std::time::Duration;

    fn record(sender: &str, body: &str) -> MessageRecord {
        MessageRecord {
            seq: 0,
            sender: sender.to_string(),
            body: body.to_string(),
            timestamp: Utc::now(),
            receivers: [SYSTEM.to_string()].into_iter().collect(),
            readers: Default::default(),
        }
    }

    fn scheduler() -> Arc<ReminderScheduler> {
        let notify: Notifier = Arc::new(|_: &str| {});
        Arc::new(ReminderScheduler::new(
            notify,
            Duration::from_secs(1),
            chrono_tz::UTC,
        ))
    }

    #[tokio::test]
    async fn test_remind_me_sets_reminder_for_sender() {
        let scheduler = scheduler();
        let agent = SystemAgent::new(scheduler.clone(), None);

        let reply = agent
            .handle(SYSTEM, &record("human", "@system remind me in 10 minutes: stretch"))
            .await
            .unwrap();
        assert!(reply.starts_with("@human Reminder reminder_"), "{reply}");

        let active = scheduler.list();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].owner, "human");
        assert_eq!(active[0].message, "stretch");
    }

    #[tokio::test]
    async fn test_commands_use_the_registered_name() {
        let scheduler = scheduler();
        let agent = SystemAgent::new(scheduler.clone(), None);

        let reply = agent
            .handle(
                "servant",
                &record("human", "@servant remind me in 10 minutes: stretch"),
            )
            .await
            .unwrap();
        assert!(reply.starts_with("@human Reminder reminder_"), "{reply}");
        assert_eq!(scheduler.list()[0].message, "stretch");

        let reply = agent
            .handle("servant", &record("human", "@servant what can you do?"))
            .await
            .unwrap();
        assert!(reply.starts_with("@human I can set reminders"), "{reply}");
    }

    #[tokio::test]
    async fn test_remind_other_agent_and_cancel() {
        let scheduler = scheduler();
        let agent = SystemAgent::new(scheduler.clone(), None);

        agent
            .handle(SYSTEM, &record("human", "remind @poet in 1 hour: write a sonnet"))
            .await
            .unwrap();
        let id = scheduler.list()[0].id.clone();
        assert!(id.ends_with("_poet"));

        let reply = agent
            .handle(SYSTEM, &record("human", &format!("cancel reminder {id}")))
            .await;
        assert_eq!(reply, Some(format!("@human Cancelled reminder {id}.")));
        assert!(scheduler.list().is_empty());

        let reply = agent
            .handle(SYSTEM, &record("human", &format!("cancel reminder {id}")))
            .await
            .unwrap();
        assert!(reply.contains("No active reminder"));
    }

    #[tokio::test]
    async fn test_own_messages_get_no_reply() {
        let scheduler = scheduler();
        let model = Arc::new(ScriptedModel::new().reply("unused"));
        let agent = SystemAgent::new(scheduler.clone(), Some(model.clone()));

        let notification = record(SYSTEM, "REMINDER for @system: rotate the logs");
        assert_eq!(agent.handle(SYSTEM, &notification).await, None);

        let command = record(SYSTEM, "remind me in 1 hour: again");
        assert_eq!(agent.handle(SYSTEM, &command).await, None);

        assert!(scheduler.list().is_empty());
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_overheard_chatter_gets_no_reply() {
        let model = Arc::new(ScriptedModel::new().reply("unused"));
        let agent = SystemAgent::new(scheduler(), Some(model.clone()));

        assert_eq!(agent.handle(SYSTEM, &record("human", "@poet a haiku")).await, None);
        assert_eq!(agent.handle(SYSTEM, &record("human", "@all good morning")).await, None);
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_bad_time_is_reported_to_sender() {
        let agent = SystemAgent::new(scheduler(), None);
        let reply = agent
            .handle(SYSTEM, &record("alice", "remind me 2001-01-01 00:00: too late"))
            .await
            .unwrap();
        assert!(reply.starts_with("@alice "));
        assert!(reply.contains("future"));
    }

    #[tokio::test]
    async fn test_without_model_replies_with_usage() {
        let agent = SystemAgent::new(scheduler(), None);
        let reply = agent
            .handle(SYSTEM, &record("human", "what can you do?"))
            .await
            .unwrap();
        assert!(reply.starts_with("@human I can set reminders"));
    }

    #[tokio::test]
    async fn test_model_extracts_free_form_reminder() {
        let scheduler = scheduler();
        let model = Arc::new(
            ScriptedModel::new()
                .reply(r#"{"owner": "me", "message": "call mom", "due": "in 2 hours"}"#),
        );
        let agent = SystemAgent::new(scheduler.clone(), Some(model.clone()));

        let reply = agent
            .handle(
                SYSTEM,
                &record("human", "could you remind me to call mom in two hours"),
            )
            .await
            .unwrap();
        assert!(reply.contains("Reminder reminder_"), "{reply}");
        assert_eq!(scheduler.list()[0].owner, "human");
        assert_eq!(model.requests()[0].shape, parley_agent::model::OutputShape::Json);
    }

    #[tokio::test]
    async fn test_undecodable_extraction_uses_fallback() {
        let scheduler = scheduler();
        let model = Arc::new(ScriptedModel::new().reply("sure thing!"));
        let agent = SystemAgent::new(scheduler.clone(), Some(model));

        let reply = agent
            .handle(SYSTEM, &record("human", "please remind me about the thing"))
            .await
            .unwrap();
        assert!(reply.contains("could not understand"));
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn test_chat_reply_and_model_failure() {
        let model = Arc::new(ScriptedModel::new().reply("It is sunny. @human").fail("503"));
        let agent = SystemAgent::new(scheduler(), Some(model));

        let reply = agent.handle(SYSTEM, &record("human", "how is the weather")).await;
        assert_eq!(reply.as_deref(), Some("@human It is sunny."));

        let reply = agent.handle(SYSTEM, &record("human", "and tomorrow?")).await;
        assert_eq!(
            reply.as_deref(),
            Some("@human Sorry, I cannot answer that right now.")
        );
    }

    #[tokio::test]
    async fn test_custom_instructions_reach_the_model() {
        let model = Arc::new(ScriptedModel::new().reply("Aye."));
        let agent = SystemAgent::new(scheduler(), Some(model.clone()))
            .with_instructions("Talk like a pirate.");

        agent.handle(SYSTEM, &record("human", "hello")).await.unwrap();
        assert_eq!(model.requests()[0].system, "Talk like a pirate.");

        let model = Arc::new(ScriptedModel::new().reply("Hi."));
        let agent = SystemAgent::new(scheduler(), Some(model.clone())).with_instructions("  ");
        agent.handle(SYSTEM, &record("human", "hello")).await.unwrap();
        assert_eq!(model.requests()[0].system, DEFAULT_INSTRUCTIONS);
    }

    #[tokio::test]
    async fn test_batch_answers_every_record() {
        let agent = SystemAgent::new(scheduler(), None);
        let handle = agent.into_handle();
        let rx = handle
            .respond(
                SYSTEM,
                vec![
                    record("alice", "hello"),
                    record(SYSTEM, "REMINDER for @system: skip me"),
                    record("bob", "hi"),
                ],
            )
            .await
            .unwrap();
        let reply = rx.into_response().await.unwrap().unwrap();
        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("@alice"));
        assert!(lines[1].starts_with("@bob"));
    }

    #[tokio::test]
    async fn test_batch_of_own_messages_is_silent() {
        let handle = SystemAgent::new(scheduler(), None).into_handle();
        let rx = handle
            .respond(SYSTEM, vec![record(SYSTEM, "REMINDER for @system: stretch")])
            .await
            .unwrap();
        assert_eq!(rx.into_response().await.unwrap(), None);
    }
}
