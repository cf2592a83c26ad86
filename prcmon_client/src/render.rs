//! Turning decoded records into console text or JSON lines.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_no_std::record::{CodecError, Record};

/// 100ns intervals between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH_DIFF: i64 = 116_444_736_000_000_000;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;

/// Converts a kernel system time (100ns intervals since 1601) into a UTC timestamp.
pub fn filetime_to_utc(time: i64) -> Option<DateTime<Utc>> {
    let since_unix = time.checked_sub(FILETIME_UNIX_EPOCH_DIFF)?;
    let secs = since_unix.div_euclid(FILETIME_TICKS_PER_SEC);
    let nanos = (since_unix.rem_euclid(FILETIME_TICKS_PER_SEC) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

fn format_time(time: i64) -> String {
    match filetime_to_utc(time) {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => format!("{time}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventColor {
    Create,
    Exit,
    Plain,
}

/// One record ready to print: a coloured title followed by plain detail lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEvent {
    pub title: String,
    pub color: EventColor,
    pub body: String,
}

pub fn render_text(record: &Result<Record<'_>, CodecError>) -> RenderedEvent {
    match record {
        Ok(Record::ProcessCreate(info)) => {
            let mut body = format!(
                "\tTime:{}\n\tPID:{}\n\tPPID:{}\n",
                format_time(info.time),
                info.process_id,
                info.parent_process_id
            );
            if let Some(cmd) = info.command_line {
                body.push_str(&format!("\tCommandLine:{}\n", cmd.to_string_lossy()));
            }
            body.push('\n');

            RenderedEvent {
                title: "ProcessCreate:\n".to_string(),
                color: EventColor::Create,
                body,
            }
        }
        Ok(Record::ProcessExit(info)) => RenderedEvent {
            title: "ProcessExit:\n".to_string(),
            color: EventColor::Exit,
            body: format!(
                "\tTime:{}\n\tPID:{}\n\tExitStatus:{}\n\n",
                format_time(info.time),
                info.process_id,
                info.exit_status
            ),
        },
        Err(CodecError::UnknownType { tag, .. }) => RenderedEvent {
            title: String::new(),
            color: EventColor::Plain,
            body: format!("Unknown item type: {tag}\n"),
        },
        Err(e) => RenderedEvent {
            title: String::new(),
            color: EventColor::Plain,
            body: format!("Malformed data from driver: {e}\n"),
        },
    }
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum JsonEvent {
    ProcessCreate {
        time: String,
        pid: u32,
        ppid: u32,
        command_line: Option<String>,
    },
    ProcessExit {
        time: String,
        pid: u32,
        exit_status: u32,
    },
}

impl From<&Record<'_>> for JsonEvent {
    fn from(record: &Record<'_>) -> Self {
        match record {
            Record::ProcessCreate(info) => JsonEvent::ProcessCreate {
                time: format_time(info.time),
                pid: info.process_id,
                ppid: info.parent_process_id,
                command_line: info.command_line.map(|c| c.to_string_lossy()),
            },
            Record::ProcessExit(info) => JsonEvent::ProcessExit {
                time: format_time(info.time),
                pid: info.process_id,
                exit_status: info.exit_status,
            },
        }
    }
}
