//! Keyboard commands for the `run` screen.

use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Snooze(Option<u64>),
    Dismiss,
    Cancel,
    Status,
}

pub fn parse_command(line: &str) -> Option<UserCommand> {
    let mut words = line.split_whitespace();
    let cmd = match words.next()?.to_ascii_lowercase().as_str() {
        "s" | "snooze" => {
            let secs = match words.next() {
                Some(w) => Some(w.parse().ok()?),
                None => None,
            };
            UserCommand::Snooze(secs)
        }
        "d" | "dismiss" => UserCommand::Dismiss,
        "c" | "cancel" | "q" | "quit" => UserCommand::Cancel,
        "?" | "status" => UserCommand::Status,
        _ => return None,
    };
    Some(cmd)
}

/// Reads stdin on its own thread so a pending read never holds up shutdown.
pub fn spawn_reader() -> mpsc::Receiver<UserCommand> {
    let (tx, rx) = mpsc::channel(8);
    let spawned = std::thread::Builder::new().name("wakestop-stdin".to_string()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(cmd) => {
                    if tx.blocking_send(cmd).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("commands: s [secs] | d | c | ?"),
            }
        }
        debug!("console: stdin closed");
    });
    if let Err(e) = spawned {
        debug!("console: no stdin reader: {}", e);
    }
    rx
}
