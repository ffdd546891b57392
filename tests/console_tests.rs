// ABOUTME: Tests for console command handling against a live router and scheduler.
// ABOUTME: Drives Console::handle_line and Console::run with in-memory input.

use chrono::{Duration as ChronoDuration, Utc};
use parley::app::leave_announcement;
use parley::console::{render, Console, ConsoleAction};
use parley_agent::backends::mock::MockBackend;
use parley_core::{
    EmptyMentionPolicy, Notifier, ReminderScheduler, Router, HUMAN, SYSTEM,
};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<Router>, Arc<ReminderScheduler>, Console) {
    let router = Arc::new(Router::new(EmptyMentionPolicy::Store));
    let notify: Notifier = Arc::new(|_text: &str| {});
    let scheduler = Arc::new(ReminderScheduler::new(
        notify,
        Duration::from_secs(1),
        chrono_tz::UTC,
    ));
    let console = Console::new(router.clone(), scheduler.clone(), SYSTEM);
    (router, scheduler, console)
}

fn output(action: ConsoleAction) -> Vec<String> {
    match action {
        ConsoleAction::Continue(lines) => lines,
        ConsoleAction::Exit => panic!("unexpected exit"),
    }
}

#[tokio::test]
async fn test_plain_message_goes_to_default_recipient() {
    let (router, _scheduler, console) = setup();

    assert!(output(console.handle_line("what time is it?")).is_empty());

    let history = router.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender, HUMAN);
    assert!(history[0].receivers.contains(SYSTEM));
    assert_eq!(router.unread(SYSTEM).len(), 1);
}

#[tokio::test]
async fn test_mentions_are_added_to_default_recipient() {
    let (router, _scheduler, console) = setup();
    router
        .agents()
        .register("alice", MockBackend::new().into_handle())
        .unwrap();

    console.handle_line("@alice hello");

    let history = router.history();
    assert!(history[0].receivers.contains("alice"));
    assert!(history[0].receivers.contains(SYSTEM));
    assert_eq!(router.unread("alice").len(), 1);
    assert_eq!(router.unread(SYSTEM).len(), 1);
}

#[tokio::test]
async fn test_chat_dumps_history() {
    let (router, _scheduler, console) = setup();
    assert_eq!(output(console.handle_line("CHAT")), vec!["No messages yet."]);

    router.post("alice", "@human done").unwrap();
    let lines = output(console.handle_line("CHAT"));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("alice: @human done"), "{}", lines[0]);
    assert!(lines[0].starts_with('['));
}

#[tokio::test]
async fn test_log_toggles_message_logging() {
    let (router, _scheduler, console) = setup();

    assert_eq!(
        output(console.handle_line("LOG")),
        vec!["Message logging enabled"]
    );
    assert!(router.log_messages());
    assert_eq!(
        output(console.handle_line("LOG")),
        vec!["Message logging disabled"]
    );
    assert!(!router.log_messages());
}

#[tokio::test]
async fn test_reminders_and_cancel() {
    let (_router, scheduler, console) = setup();
    assert_eq!(
        output(console.handle_line("REMINDERS")),
        vec!["No active reminders."]
    );

    let id = scheduler
        .add_time_reminder("alice", "ship it", Utc::now() + ChronoDuration::hours(1))
        .unwrap();
    let lines = output(console.handle_line("REMINDERS"));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(&id));
    assert!(lines[0].contains("@alice"));
    assert!(lines[0].ends_with("ship it"));

    assert_eq!(
        output(console.handle_line(&format!("CANCEL {id}"))),
        vec![format!("Cancelled {id}")]
    );
    assert!(!scheduler.is_active(&id));
    assert_eq!(
        output(console.handle_line(&format!("CANCEL {id}"))),
        vec![format!("No active reminder {id}")]
    );
}

#[tokio::test]
async fn test_agents_lists_registered_agents() {
    let (router, _scheduler, console) = setup();
    assert_eq!(
        output(console.handle_line("AGENTS")),
        vec!["No agents registered."]
    );

    router
        .agents()
        .register("alice", MockBackend::new().into_handle())
        .unwrap();
    assert_eq!(output(console.handle_line("AGENTS")), vec!["alice (mock) idle"]);
}

#[tokio::test]
async fn test_kick_removes_agent_and_announces_it() {
    let (router, _scheduler, console) = setup();
    router
        .agents()
        .register("alice", MockBackend::new().into_handle())
        .unwrap();

    assert_eq!(
        output(console.handle_line("KICK alice")),
        vec!["Removed alice"]
    );
    assert!(!router.agents().contains("alice"));

    let history = router.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender, SYSTEM);
    assert_eq!(history[0].body, leave_announcement("alice"));
    assert_eq!(router.unread(HUMAN).len(), 1);

    let lines = output(console.handle_line("KICK alice"));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("Not removed"), "{}", lines[0]);
    assert_eq!(router.len(), 1);
}

#[tokio::test]
async fn test_exit_and_empty_lines() {
    let (router, _scheduler, console) = setup();

    assert!(output(console.handle_line("   ")).is_empty());
    assert!(router.is_empty());
    assert_eq!(console.handle_line("EXIT"), ConsoleAction::Exit);
    assert!(!output(console.handle_line("HELP")).is_empty());
}

#[tokio::test]
async fn test_rejected_message_is_reported() {
    let router = Arc::new(Router::new(EmptyMentionPolicy::Reject));
    let notify: Notifier = Arc::new(|_text: &str| {});
    let scheduler = Arc::new(ReminderScheduler::new(
        notify,
        Duration::from_secs(1),
        chrono_tz::UTC,
    ));
    let console = Console::new(router.clone(), scheduler, SYSTEM);

    // A default recipient always fills the receivers, so nothing is rejected
    assert!(output(console.handle_line("hello")).is_empty());
    assert_eq!(router.len(), 1);
}

#[tokio::test]
async fn test_run_stops_at_exit() {
    let (router, _scheduler, console) = setup();
    let input: &[u8] = b"first\nsecond\nEXIT\nnever sent\n";

    console.run(input).await;

    let bodies: Vec<String> = router.history().into_iter().map(|r| r.body).collect();
    assert_eq!(bodies, vec!["first", "second"]);
}

#[tokio::test]
async fn test_render_strips_human_mention() {
    let (router, _scheduler, _console) = setup();
    let record = router.post("alice", "@human all done").unwrap();
    assert_eq!(render(&record), "alice: all done");
}
