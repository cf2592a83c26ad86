//! Printing rendered events, coloured through the console text attributes on Windows.

use std::io::{self, Write};

use serde_json::to_string;
use shared_no_std::record::decode_records;

use crate::{
    render::{render_text, EventColor, JsonEvent, RenderedEvent},
    settings::OutputFormat,
};

#[cfg(windows)]
mod colour {
    use windows::Win32::System::Console::{
        GetStdHandle, SetConsoleTextAttribute, CONSOLE_CHARACTER_ATTRIBUTES, FOREGROUND_BLUE, FOREGROUND_GREEN,
        FOREGROUND_INTENSITY, FOREGROUND_RED, STD_OUTPUT_HANDLE,
    };

    use crate::render::EventColor;

    fn attributes(color: EventColor) -> CONSOLE_CHARACTER_ATTRIBUTES {
        match color {
            EventColor::Create => FOREGROUND_BLUE | FOREGROUND_INTENSITY,
            EventColor::Exit => FOREGROUND_RED | FOREGROUND_BLUE | FOREGROUND_INTENSITY,
            EventColor::Plain => FOREGROUND_RED | FOREGROUND_GREEN | FOREGROUND_BLUE,
        }
    }

    /// Best effort, output redirected to a file has no console to colour.
    pub fn set(color: EventColor) {
        unsafe {
            if let Ok(console) = GetStdHandle(STD_OUTPUT_HANDLE) {
                let _ = SetConsoleTextAttribute(console, attributes(color));
            }
        }
    }
}

#[cfg(not(windows))]
mod colour {
    use crate::render::EventColor;

    pub fn set(_color: EventColor) {}
}

pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Printer { format }
    }

    /// Prints every record in a buffer returned by a read.
    pub fn display(&self, buf: &[u8]) -> anyhow::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();

        for record in decode_records(buf) {
            match self.format {
                OutputFormat::Text => print_event(&mut out, &render_text(&record))?,
                OutputFormat::Json => match record {
                    Ok(r) => writeln!(out, "{}", to_string(&JsonEvent::from(&r))?)?,
                    Err(e) => log::warn!("Skipping record: {e}"),
                },
            }
        }

        out.flush()?;
        Ok(())
    }
}

fn print_event(out: &mut impl Write, event: &RenderedEvent) -> io::Result<()> {
    if !event.title.is_empty() {
        // colour only applies to what has already reached the console
        out.flush()?;
        colour::set(event.color);
        write!(out, "{}", event.title)?;
        out.flush()?;
        // Reset color:
        colour::set(EventColor::Plain);
    }
    write!(out, "{}", event.body)
}
