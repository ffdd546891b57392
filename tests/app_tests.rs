// ABOUTME: Integration tests for App wiring - agents from config, the system agent and reminders.
// ABOUTME: Uses mock backends and a collecting human output; no model or console involved.

use chrono::{Duration as ChronoDuration, Utc};
use parley::app::{join_announcement, leave_announcement, remove_agent, App};
use parley_agent::testing::ScriptedModel;
use parley_agent::BackendRegistry;
use parley_core::config::Config;
use parley_core::reminder_store::reminder_id;
use parley_core::{CollectingOutput, ReminderEntry, ReminderStatus, ReminderStore, HUMAN, SYSTEM};
use std::sync::Arc;
use tempfile::TempDir;

const BASE: &str = r#"
[chat]
poll_interval_ms = 20

[scheduler]
timezone = "UTC"

[[agents]]
name = "echo"

[agents.backend]
type = "mock"
reply = "hello @human"
"#;

fn build(toml: &str) -> (App, Arc<CollectingOutput>) {
    let config = Config::parse(toml).unwrap();
    let human = Arc::new(CollectingOutput::new());
    let app = App::build(config, human.clone(), None, &BackendRegistry::default()).unwrap();
    (app, human)
}

#[tokio::test]
async fn test_build_registers_system_and_configured_agents() {
    let (app, _human) = build(BASE);
    let agents = app.router().agents();

    assert!(agents.contains(SYSTEM));
    assert!(agents.contains("echo"));
    assert_eq!(agents.len(), 2);
    assert_eq!(agents.get("echo").unwrap().name(), "mock");
}

#[tokio::test]
async fn test_configured_agents_are_announced_to_human() {
    let (app, human) = build(BASE);

    let history = app.router().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender, SYSTEM);
    assert_eq!(history[0].body, join_announcement("echo"));
    assert!(history[0].receivers.contains(HUMAN));

    let report = app.dispatcher().tick();
    assert_eq!(report.human_delivered, 1);
    assert!(human.lines()[0].contains("echo has joined the chat"));
}

#[tokio::test]
async fn test_agent_reply_reaches_human() {
    let (app, human) = build(BASE);
    app.dispatcher().tick();

    app.router().post(HUMAN, "@echo are you there?").unwrap();
    let report = app.dispatcher().tick();
    assert_eq!(report.dispatched, vec!["echo".to_string()]);
    app.dispatcher().drain().await;

    app.dispatcher().tick();
    let lines = human.lines();
    assert_eq!(lines.last().unwrap(), "hello");
}

#[tokio::test]
async fn test_unmentioned_human_message_reaches_system_agent() {
    let (app, human) = build(BASE);
    app.dispatcher().tick();

    app.router()
        .post_with_default(HUMAN, "remind me in 10 minutes: stretch", SYSTEM)
        .unwrap();
    app.dispatcher().tick();
    app.dispatcher().drain().await;

    let reminders = app.scheduler().list();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].owner, HUMAN);
    assert_eq!(reminders[0].message, "stretch");

    app.dispatcher().tick();
    let last = human.lines().pop().unwrap();
    assert!(last.contains("Reminder reminder_"), "{last}");
}

#[tokio::test]
async fn test_due_reminder_notifies_owner_through_chat() {
    let (app, _human) = build(BASE);

    let id = app
        .scheduler()
        .add_time_reminder("echo", "stand up", Utc::now() - ChronoDuration::seconds(1))
        .unwrap();
    assert_eq!(app.scheduler().tick(), 1);
    assert!(!app.scheduler().is_active(&id));

    let unread = app.router().unread("echo");
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].sender, SYSTEM);
    assert_eq!(unread[0].body, "REMINDER for @echo: stand up");
}

#[tokio::test]
async fn test_reminder_for_system_agent_does_not_loop() {
    let (app, _human) = build(BASE);
    app.dispatcher().tick();

    let due = Utc::now() - ChronoDuration::seconds(1);
    app.scheduler()
        .add_time_reminder(SYSTEM, "rotate the logs", due)
        .unwrap();
    assert_eq!(app.scheduler().tick(), 1);

    for _ in 0..5 {
        app.dispatcher().tick();
        app.dispatcher().drain().await;
    }

    let history = app.router().history();
    assert_eq!(history.len(), 2, "{history:?}");
    assert_eq!(history[1].body, "REMINDER for @system: rotate the logs");
    assert!(app.router().unread(SYSTEM).is_empty());
}

#[tokio::test]
async fn test_addressed_message_also_reaches_system_agent() {
    let (app, _human) = build(BASE);
    app.dispatcher().tick();

    app.router()
        .post_with_default(HUMAN, "remind @echo in 1 hour: stand up", SYSTEM)
        .unwrap();
    app.dispatcher().tick();
    app.dispatcher().drain().await;

    let reminders = app.scheduler().list();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].owner, "echo");

    // Chatter for another agent gets no answer from the system agent
    let before = app.router().len();
    app.router()
        .post_with_default(HUMAN, "@echo how are you", SYSTEM)
        .unwrap();
    app.dispatcher().tick();
    app.dispatcher().drain().await;
    let replies: Vec<_> = app.router().history()[before..]
        .iter()
        .filter(|r| r.sender == SYSTEM)
        .cloned()
        .collect();
    assert!(replies.is_empty(), "{replies:?}");
}

#[tokio::test]
async fn test_removed_agent_is_announced_and_no_longer_dispatched() {
    let (app, human) = build(BASE);
    app.dispatcher().tick();

    remove_agent(app.router(), "echo").unwrap();
    assert!(!app.router().agents().contains("echo"));
    assert!(remove_agent(app.router(), "echo").is_err());

    app.dispatcher().tick();
    assert!(human.lines().last().unwrap().contains("echo has left the chat"));
    assert_eq!(
        app.router().history().last().unwrap().body,
        leave_announcement("echo")
    );

    app.router().post(HUMAN, "@echo still there?").unwrap();
    assert!(app.dispatcher().tick().dispatched.is_empty());
}

#[tokio::test]
async fn test_system_instructions_reach_model() {
    let toml = r#"
[chat]
system_instructions = "Answer like a butler."

[scheduler]
timezone = "UTC"
"#;
    let config = Config::parse(toml).unwrap();
    let model = Arc::new(ScriptedModel::new().reply("Very good."));
    let human = Arc::new(CollectingOutput::new());
    let app = App::build(
        config,
        human.clone(),
        Some(model.clone()),
        &BackendRegistry::default(),
    )
    .unwrap();

    app.router()
        .post_with_default(HUMAN, "good evening", SYSTEM)
        .unwrap();
    app.dispatcher().tick();
    app.dispatcher().drain().await;

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system, "Answer like a butler.");

    app.dispatcher().tick();
    assert_eq!(human.lines(), vec!["Very good."]);
}

#[tokio::test]
async fn test_configured_agent_can_take_default_recipient_name() {
    let toml = r#"
[scheduler]
timezone = "UTC"

[[agents]]
name = "system"

[agents.backend]
type = "mock"
"#;
    let (app, _human) = build(toml);
    let agents = app.router().agents();

    assert_eq!(agents.len(), 1);
    assert_eq!(agents.get(SYSTEM).unwrap().name(), "mock");
}

#[tokio::test]
async fn test_unknown_backend_fails_build() {
    let config = Config::parse(
        "[scheduler]\ntimezone = \"UTC\"\n\
         [[agents]]\nname = \"x\"\n[agents.backend]\ntype = \"nope\"\n",
    )
    .unwrap();
    let human = Arc::new(CollectingOutput::new());
    let err = App::build(config, human, None, &BackendRegistry::default())
        .err()
        .unwrap();
    assert!(format!("{err:#}").contains("'x'"));
}

#[tokio::test]
async fn test_pending_reminders_restored_on_build() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reminders.md");
    let store = ReminderStore::new(&path);
    store.ensure_exists().unwrap();

    let due = (Utc::now() + ChronoDuration::hours(1)).naive_utc();
    let pending = reminder_id(1, "echo");
    let done = reminder_id(2, "echo");
    store
        .add(ReminderEntry::pending(&pending, "water plants", Some(due), None))
        .unwrap();
    store
        .add(ReminderEntry::pending(&done, "old news", Some(due), None))
        .unwrap();
    store.set_status(&done, ReminderStatus::Finished).unwrap();

    let toml = format!(
        "[scheduler]\ntimezone = \"UTC\"\nreminders_file = '{}'\n\n\
         [[agents]]\nname = \"echo\"\n[agents.backend]\ntype = \"mock\"\n",
        path.display()
    );
    let (app, _human) = build(&toml);

    let active = app.scheduler().list();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, pending);
    assert_eq!(active[0].owner, "echo");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_both_loops() {
    let (app, human) = build(BASE);
    let running = app.start();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    app.shutdown(running).await;

    assert!(!app.dispatcher().is_running());
    assert!(!app.scheduler().is_running());
    assert_eq!(app.dispatcher().inflight(), 0);
    assert_eq!(human.lines().len(), 1);
}
