use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use stepwise::{logging, EnvConfig};
use stepwise_client::client::Client;
use stepwise_client::commands::HELP_TEXT;
use stepwise_client::console::ConsoleView;
use stepwise_client::runtime::{lock_unpoisoned, RuntimeController};
use stepwise_client::servers;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn main() -> io::Result<()> {
    let config = EnvConfig::from_env().map_err(io::Error::other)?;
    if !logging::init_tracing(&config.log_filter) {
        eprintln!(
            "stepwise: ignoring log filter '{}'; logging stays disabled",
            config.log_filter
        );
    }

    let server = servers::server_from_config(&config).map_err(io::Error::other)?;
    let client = Arc::new(Mutex::new(Client::new(config.engine_config())));
    let mut host = RuntimeController::new(Arc::clone(&client), server);
    let mut console = ConsoleView::new(io::stdout());

    tracing::info!(server = host.server_id(), "stepwise started");
    console.notice(&format!("stepwise ({}) - {HELP_TEXT}", host.server_id()))?;
    lock_unpoisoned(&client).refresh(&mut host);

    let lines = spawn_stdin_reader()?;
    let mut input_closed = false;

    loop {
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                let mut client = lock_unpoisoned(&client);
                client.on_input_replace(line);
                client.on_submit(&mut host);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                input_closed = true;
                thread::sleep(POLL_INTERVAL);
            }
        }

        host.flush_pending_run_events();
        let (instructions, notices, done) = {
            let mut client = lock_unpoisoned(&client);
            let done = client.should_exit
                || (input_closed && !client.is_generating() && !host.has_pending_events());
            (
                client.take_render_instructions(),
                client.take_notices(),
                done,
            )
        };

        console.present(&instructions)?;
        for notice in &notices {
            console.notice(notice)?;
        }

        if done || host.is_stop_requested() {
            break;
        }
    }

    if input_closed {
        host.join_workers();
    }
    Ok(())
}

/// Forwards stdin lines to the polling loop; the channel closes on EOF.
fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("stepwise-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if sender.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(receiver)
}
