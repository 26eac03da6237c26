//! Interactive retune channel: one command per stdin line.
//!
//! A line is either the literal `quit` or a new tuning frequency
//! (suffix-aware, like the `-f` flag). The read is cancellable so an
//! external shutdown never leaves this task blocked on input.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::parse_frequency;
use crate::sdr::Tuner;
use crate::session::Session;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("not a frequency or 'quit': '{0}'")]
    InvalidFrequency(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Retune(u32),
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.starts_with("quit") {
        return Ok(Command::Quit);
    }
    match parse_frequency(line) {
        Ok(freq) if freq != 0 => Ok(Command::Retune(freq)),
        _ => Err(CommandError::InvalidFrequency(line.to_string())),
    }
}

/// Run the stdin command loop until quit, EOF or session cancellation.
pub async fn run(session: Session, tuner: Tuner) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = session.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line) {
                        Ok(Command::Quit) => {
                            info!("quit requested");
                            session.cancel();
                            break;
                        }
                        Ok(Command::Retune(freq)) => {
                            info!("retune requested: {} Hz", freq);
                            tuner.retune(freq);
                        }
                        Err(e) => warn!("{}", e),
                    }
                }
                // stdin closed; the session keeps running on signals
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin read error: {}", e);
                    break;
                }
            }
        }
    }
}
