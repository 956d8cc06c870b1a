//! Destinations for script output and statement traces.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use log::Level;
use serde::Serialize;
use yansi::Paint;

/// Receives the output of `log` statements and reported script errors.
pub trait Logger {
    fn log(&mut self, level: Level, message: &str);
}

/// Info messages go to stdout. Everything else goes through the `log`
/// facade; errors and warnings fall back to colored stderr output when no
/// facade logger takes them.
#[derive(Debug, Default)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&mut self, level: Level, message: &str) {
        match level {
            Level::Info => println!("{}", message),
            Level::Error | Level::Warn if log::log_enabled!(level) => {
                log::log!(level, "{}", message)
            }
            Level::Error => eprintln!("{}", message.red()),
            Level::Warn => eprintln!("{}", message.yellow()),
            Level::Debug | Level::Trace => log::log!(level, "{}", message),
        }
    }
}

/// Records messages in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    messages: Rc<RefCell<Vec<(Level, String)>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.borrow().clone()
    }

    /// Messages logged at `level`.
    pub fn at(&self, level: Level) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Logger for MemoryLogger {
    fn log(&mut self, level: Level, message: &str) {
        self.messages.borrow_mut().push((level, message.to_string()));
    }
}

/// One executed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub script: String,
    pub line: usize,
    pub statement: String,
}

pub trait TraceSink {
    fn trace(&mut self, event: &TraceEvent);
}

/// Human-readable trace on a writer (stderr by default).
pub struct TextTrace<W: Write = io::Stderr> {
    out: W,
}

impl TextTrace {
    pub fn stderr() -> Self {
        Self { out: io::stderr() }
    }
}

impl<W: Write> TextTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TraceSink for TextTrace<W> {
    fn trace(&mut self, event: &TraceEvent) {
        if let Err(e) = writeln!(self.out, "{}:{}: {}", event.script, event.line, event.statement) {
            log::warn!("trace output failed: {}", e);
        }
    }
}

/// One JSON object per line.
pub struct JsonTrace<W: Write = io::Stderr> {
    out: W,
}

impl JsonTrace {
    pub fn stderr() -> Self {
        Self { out: io::stderr() }
    }
}

impl<W: Write> JsonTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TraceSink for JsonTrace<W> {
    fn trace(&mut self, event: &TraceEvent) {
        let written = serde_json::to_writer(&mut self.out, event)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out));
        if let Err(e) = written {
            log::warn!("trace output failed: {}", e);
        }
    }
}
