mod support;

use agent_protocol::AgentServer;
use agent_server_mock::{MockServer, RunScript, ScriptedStep};
use pretty_assertions::assert_eq;
use stepwise::{PendingKind, TranscriptEntry};
use stepwise_client::client::Client;
use support::ServerHost;

fn submit(client: &mut Client, host: &mut ServerHost<MockServer>, input: &str) {
    client.on_input_replace(input.to_string());
    client.on_submit(host);
}

#[test]
fn submit_appends_user_message_and_starts_run() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());

    submit(&mut client, &mut host, "  describe the plan  ");

    assert_eq!(host.started, vec!["describe the plan".to_string()]);
    assert_eq!(client.input, "");
    assert_eq!(
        client.transcript().entries(),
        &[TranscriptEntry::UserMessage {
            text: "describe the plan".to_string()
        }]
    );
    assert_eq!(client.context().active_run, Some(1));
    assert!(client.is_generating());
    assert_eq!(host.render_requests, 1);
}

#[test]
fn blank_input_is_a_silent_no_op() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());

    submit(&mut client, &mut host, "   ");

    assert!(host.started.is_empty());
    assert!(client.transcript().is_empty());
    assert!(client.take_notices().is_empty());
    assert_eq!(host.render_requests, 1);
}

#[test]
fn submit_while_generating_is_rejected() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());

    submit(&mut client, &mut host, "first");
    submit(&mut client, &mut host, "second");

    assert_eq!(host.started, vec!["first".to_string()]);
    assert_eq!(client.transcript().len(), 1);
    assert_eq!(
        client.take_notices(),
        vec!["A run is already in progress.".to_string()]
    );

    host.deliver_all(&mut client);
    submit(&mut client, &mut host, "second");
    assert_eq!(host.started.len(), 2);
}

#[test]
fn completed_run_renders_steps_and_final_answer() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());
    host.server.push_script(RunScript::answering(
        vec![ScriptedStep::new("Compute", "print(6 * 7)")
            .calling("python_interpreter")
            .observing("42")],
        "42",
    ));

    host.run_to_completion(&mut client, "what is 6 * 7?");

    let entries = client.transcript().entries();
    assert_eq!(entries.len(), 3);
    let step = entries[1].as_step().expect("second entry is a step");
    assert_eq!(step.step_number, 1);
    assert_eq!(step.thought.as_deref(), Some("Compute"));
    assert_eq!(step.code_action.as_deref(), Some("print(6 * 7)"));
    assert_eq!(
        entries[2],
        TranscriptEntry::FinalAnswer {
            content: "42".to_string(),
            is_image: false
        }
    );
    assert!(!client.is_generating());
    assert_eq!(client.directory().sessions().len(), 1);
}

#[test]
fn run_error_is_rendered_inline_and_restores_idle() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());
    host.server
        .push_script(RunScript::failing(Vec::new(), "model unavailable"));

    host.run_to_completion(&mut client, "task");

    assert_eq!(
        client.transcript().last(),
        Some(&TranscriptEntry::SystemError {
            message: "model unavailable".to_string()
        })
    );
    assert!(!client.is_generating());
    assert_eq!(client.context().active_run, None);

    let sessions = host.server.list_sessions().expect("list");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].preview, "task...");
}

#[test]
fn slash_commands_report_through_notices() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());

    submit(&mut client, &mut host, "/help");
    submit(&mut client, &mut host, "/load");
    submit(&mut client, &mut host, "/bogus now");

    let notices = client.take_notices();
    assert!(notices[0].contains("/confirm [name]"));
    assert_eq!(notices[1], "Usage: /load <id>");
    assert_eq!(notices[2], "Unknown command: /bogus");
    assert!(host.started.is_empty());
    assert!(client.transcript().is_empty());
}

#[test]
fn rename_waits_for_confirmation_with_a_name() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());
    host.run_to_completion(&mut client, "plan a trip");
    let id = client.directory().sessions()[0].id.clone();

    submit(&mut client, &mut host, &format!("/rename {id}"));
    assert_eq!(
        client.directory().pending().map(|pending| pending.kind),
        Some(PendingKind::Rename)
    );

    submit(&mut client, &mut host, "/confirm    ");
    assert_eq!(client.directory().pending(), None);
    assert_eq!(client.directory().sessions()[0].preview, "plan a trip...");

    submit(&mut client, &mut host, &format!("/rename {id}"));
    submit(&mut client, &mut host, "/confirm  Paris trip ");
    assert_eq!(client.directory().sessions()[0].preview, "Paris trip");
    assert_eq!(
        host.server.list_sessions().expect("list")[0].preview,
        "Paris trip"
    );
}

#[test]
fn deleting_the_active_session_keeps_the_transcript() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());
    host.run_to_completion(&mut client, "short lived");
    let id = client.context().active_session.clone().expect("active");
    let transcript = client.transcript().clone();

    submit(&mut client, &mut host, &format!("/delete {id}"));
    submit(&mut client, &mut host, "/confirm");

    assert!(client.directory().sessions().is_empty());
    assert_eq!(client.context().active_session, None);
    assert_eq!(client.transcript(), &transcript);
    assert!(host.server.list_sessions().expect("list").is_empty());
}

#[test]
fn cancelled_action_leaves_nothing_to_confirm() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());
    host.run_to_completion(&mut client, "keep me");
    let id = client.directory().sessions()[0].id.clone();

    submit(&mut client, &mut host, &format!("/delete {id}"));
    submit(&mut client, &mut host, "/cancel-action");
    client.take_notices();
    submit(&mut client, &mut host, "/confirm");

    assert_eq!(client.take_notices(), vec!["Nothing confirmed.".to_string()]);
    assert_eq!(host.server.list_sessions().expect("list").len(), 1);
}

#[test]
fn unknown_session_cannot_be_staged() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());

    submit(&mut client, &mut host, "/delete ghost");

    assert_eq!(client.directory().pending(), None);
    assert_eq!(
        client.take_notices(),
        vec!["Unknown session: ghost".to_string()]
    );
}

#[test]
fn sessions_command_lists_with_active_marker() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());
    host.run_to_completion(&mut client, "listed");
    let id = client.context().active_session.clone().expect("active");

    submit(&mut client, &mut host, "/sessions");

    let notices = client.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].starts_with("Sessions:\n  + New Chat (/new)"));
    assert!(notices[0].contains(&format!("* {id}")));
    assert!(notices[0].contains("listed..."));
}

#[test]
fn quit_requests_stop() {
    let mut client = Client::default();
    let mut host = ServerHost::new(MockServer::instant());

    submit(&mut client, &mut host, "/quit");

    assert!(client.should_exit);
    assert_eq!(host.stop_requests, 1);
}
