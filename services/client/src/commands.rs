//! Console commands and the stdin reader feeding them.

use std::{io::BufRead, thread};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const HELP: &str = "Commands: start | end | quit";

const LINE_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    End,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "start" => Command::Start,
            "end" => Command::End,
            "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Reads lines on a dedicated OS thread and forwards them over a channel.
///
/// A blocking read cannot be cancelled, so the thread is left detached; the
/// channel closes at end of input or once the receiver is dropped.
pub fn spawn_line_reader<R>(reader: R) -> std::io::Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Failed to read command input.");
                        break;
                    }
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            debug!("Command input closed.");
        })?;
    Ok(rx)
}
