use std::time::Duration;

use clap::{Parser, ValueEnum};
use shared_no_std::constants::{CLIENT_POLL_INTERVAL_MS, CLIENT_READ_BUFFER_SIZE};
use shared_no_std::record::MAX_RECORD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured, one block per event
    Text,
    /// One JSON object per line
    Json,
}

/// Reads process creation and exit events from the PrcMon driver and prints them.
#[derive(Parser, Debug, Clone)]
#[command(name = "prcmon_client", version)]
pub struct ClientSettings {
    /// Milliseconds to wait between reads from the driver
    #[arg(long, default_value_t = CLIENT_POLL_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Size in bytes of the buffer handed to each read
    #[arg(long, default_value_t = CLIENT_READ_BUFFER_SIZE, value_parser = parse_buffer_size)]
    pub buffer_size: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl ClientSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// A read never splits a record, so a buffer smaller than the largest record could leave
/// a long command line stuck at the head of the queue forever.
fn parse_buffer_size(s: &str) -> Result<usize, String> {
    let size: usize = s.parse().map_err(|e| format!("{e}"))?;
    if size < MAX_RECORD_SIZE {
        return Err(format!("buffer must be at least {MAX_RECORD_SIZE} bytes"));
    }
    Ok(size)
}
