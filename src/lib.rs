//! Search Engine Script language: a small scripting language for searching
//! and editing line buffers.
//!
//! A [`SearchEngine`] holds the global buffers and variables and runs
//! [`Script`]s against them:
//!
//! ```no_run
//! use ses::SearchEngine;
//!
//! let mut engine = SearchEngine::default();
//! engine
//!     .load_script("fix", vec!["replace s/colour/ color".to_string()])
//!     .unwrap();
//! engine.main_buffer_mut().set_lines(vec!["the colour red".to_string()]);
//! assert_eq!(engine.test_and_run(None), 0);
//! assert_eq!(engine.main_buffer().lines(), ["the color red"]);
//! ```

pub mod ast;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_io;
pub mod functions;
pub mod grammar;
pub mod interpreter;
pub mod line_list;
pub mod logger;
pub mod parser;
pub mod pattern;
pub mod position;
pub mod tokenizer;

pub use buffer::{BufferRegistry, LineBuffer, MAIN_BUFFER};
pub use config::EngineConfig;
pub use engine::SearchEngine;
pub use error::{Error, ErrorKind, Position, Result};
pub use interpreter::{Outcome, Script, ScriptHost};
pub use line_list::LineList;
pub use logger::{ConsoleLogger, JsonTrace, Logger, MemoryLogger, TextTrace, TraceEvent, TraceSink};
pub use pattern::{PatternKind, SearchExpression};
pub use position::{BufferPosition, SearchResult};
