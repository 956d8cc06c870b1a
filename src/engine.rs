//! The top-level orchestrator: global state, the script registry and the
//! call stack.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use log::Level;

use crate::buffer::{
    BufferRegistry, Buffers, LineBuffer, MAIN_BUFFER, is_global_name, is_intrinsic_name,
};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::file_io;
use crate::interpreter::{CallSite, Outcome, Script, ScriptHost};
use crate::line_list::LineList;
use crate::logger::{ConsoleLogger, Logger, TraceEvent, TraceSink};
use crate::parser;

/// An entry of the call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub script: String,
    /// Line of the `call` statement in the caller, 0 for the top level.
    pub return_line: usize,
}

/// Owns everything shared by the scripts of one run.
pub struct SearchEngine {
    config: EngineConfig,
    main: LineBuffer,
    buffers: Buffers,
    scripts: HashMap<String, Script>,
    globals: HashMap<String, String>,
    call_stack: Vec<Frame>,
    dir_stack: Vec<PathBuf>,
    logger: Box<dyn Logger>,
    trace: Option<Box<dyn TraceSink>>,
    current: Option<String>,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl SearchEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            main: LineBuffer::new(MAIN_BUFFER),
            buffers: Buffers::new(),
            scripts: HashMap::new(),
            globals: HashMap::new(),
            call_stack: Vec::new(),
            dir_stack: Vec::new(),
            logger: Box::new(ConsoleLogger),
            trace: None,
            current: None,
        }
    }

    pub fn set_logger(&mut self, logger: impl Logger + 'static) {
        self.logger = Box::new(logger);
    }

    pub fn set_trace(&mut self, trace: Option<Box<dyn TraceSink>>) {
        self.trace = trace;
    }

    /// Register a script and every `script ... endscript` block inside it.
    /// The first script loaded becomes the selected one.
    pub fn load_script(&mut self, name: &str, lines: Vec<String>) -> Result<()> {
        self.load(Script::new(name, lines))
    }

    /// Load a script file, named after the file stem. Returns that name.
    pub fn load_script_file(&mut self, path: &Path) -> Result<String> {
        let name = script_name(path)?;
        let lines = file_io::read_lines(path)?;
        self.load(Script::new(name.as_str(), lines).with_path(path))?;
        log::debug!("loaded script '{}' from {}", name, path.display());
        Ok(name)
    }

    fn load(&mut self, script: Script) -> Result<()> {
        let embedded = parser::embedded_scripts(script.name(), script.lines())?;
        let path = script.path().map(Path::to_path_buf);
        let name = script.name().to_string();
        self.add_script(script)?;
        for block in embedded {
            let mut inner = Script::new(block.name, block.lines).with_line_offset(block.first_line);
            if let Some(path) = &path {
                inner = inner.with_path(path);
            }
            self.add_script(inner)?;
        }
        if self.current.is_none() {
            self.current = Some(name);
        }
        Ok(())
    }

    pub fn add_script(&mut self, script: Script) -> Result<()> {
        if self.scripts.contains_key(script.name()) {
            return Err(Error::runtime(format!(
                "script '{}' is already loaded",
                script.name()
            )));
        }
        self.scripts.insert(script.name().to_string(), script);
        Ok(())
    }

    pub fn script(&self, name: &str) -> Option<&Script> {
        self.scripts.get(name)
    }

    /// Make `name` the script run by [`SearchEngine::test_and_run`] without
    /// an explicit name.
    pub fn select_script(&mut self, name: &str) -> Result<()> {
        if !self.scripts.contains_key(name) {
            return Err(unknown_script(name));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    pub fn selected_script(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Enter `name`, remembering the caller's line.
    pub fn push_script(&mut self, name: &str, return_line: usize) -> Result<()> {
        self.ensure_not_running(name)?;
        self.call_stack.push(Frame {
            script: name.to_string(),
            return_line,
        });
        Ok(())
    }

    fn ensure_not_running(&self, name: &str) -> Result<()> {
        if self.call_stack.iter().any(|frame| frame.script == name) {
            return Err(Error::runtime(format!(
                "script '{}' is already running",
                name
            )));
        }
        Ok(())
    }

    pub fn pop_script(&mut self) -> Option<Frame> {
        self.call_stack.pop()
    }

    pub fn call_stack(&self) -> &[Frame] {
        &self.call_stack
    }

    /// Set a parameter of the selected script. Names with the global
    /// marker set a global variable instead.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        if is_global_name(name) {
            return self.set_global_variable(name, value);
        }
        let current = self
            .current
            .as_deref()
            .ok_or_else(|| Error::runtime("no script selected"))?;
        let script = self
            .scripts
            .get_mut(current)
            .ok_or_else(|| unknown_script(current))?;
        script.set_variable(name, value);
        Ok(())
    }

    pub fn set_global_variable(&mut self, name: &str, value: &str) -> Result<()> {
        if is_intrinsic_name(name) {
            return Err(Error::runtime(format!("cannot assign to '{}'", name)));
        }
        if !is_global_name(name) {
            return Err(Error::runtime(format!(
                "'{}' is not a global variable name",
                name
            )));
        }
        self.globals.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn global_variable(&self, name: &str) -> Option<&str> {
        self.globals.get(name).map(String::as_str)
    }

    pub fn main_buffer(&self) -> &LineList {
        self.main.list()
    }

    pub fn main_buffer_mut(&mut self) -> &mut LineList {
        self.main.list_mut()
    }

    /// Check and run a script (the selected one by default). Errors are
    /// logged; the result is a process exit code.
    pub fn test_and_run(&mut self, name: Option<&str>) -> i32 {
        match self.try_run(name) {
            Ok(outcome) => outcome.code(),
            Err(e) => {
                self.logger.log(Level::Error, &e.to_string());
                1
            }
        }
    }

    /// Like [`SearchEngine::test_and_run`], but errors are returned.
    pub fn try_run(&mut self, name: Option<&str>) -> Result<Outcome> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .current
                .clone()
                .ok_or_else(|| Error::runtime("no script selected"))?,
        };
        let mut script = self
            .scripts
            .remove(&name)
            .ok_or_else(|| unknown_script(&name))?;
        let result = self.check_and_run(&name, &mut script);
        self.scripts.insert(name, script);
        result
    }

    fn check_and_run(&mut self, name: &str, script: &mut Script) -> Result<Outcome> {
        if !script.is_checked() {
            let snapshot = self.globals.clone();
            let checked = script.check().map(|_| ());
            self.globals = snapshot;
            checked?;
        }
        self.push_script(name, 0)?;
        let result = script.run(self);
        self.pop_script();
        result
    }

    /// Find a script for `call`: a loaded one, or a file next to the
    /// caller, in the working directory or in a configured directory.
    fn resolve_script(&mut self, site: &CallSite<'_>, name: &str) -> Result<String> {
        if self.scripts.contains_key(name) {
            return Ok(name.to_string());
        }
        if let Ok(stem) = script_name(Path::new(name)) {
            if self.scripts.contains_key(&stem) {
                return Ok(stem);
            }
        }
        let path = self
            .candidates(site, name)
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| unknown_script(name))?;
        self.load_script_file(&path)
    }

    fn candidates(&self, site: &CallSite<'_>, name: &str) -> Vec<PathBuf> {
        let requested = Path::new(name);
        let mut roots: Vec<PathBuf> = Vec::new();
        if requested.is_absolute() {
            roots.push(PathBuf::new());
        } else {
            roots.extend(site.dir.map(Path::to_path_buf));
            roots.extend(env::current_dir().ok());
            roots.extend(self.config.script_dirs.iter().cloned());
        }
        let mut paths = Vec::new();
        for dir in roots {
            let path = dir.join(requested);
            if path.extension().is_none() {
                paths.push(path.with_extension(&self.config.script_extension));
            }
            paths.push(path);
        }
        paths
    }
}

impl BufferRegistry for SearchEngine {
    fn buffer(&self, name: &str) -> Option<&LineBuffer> {
        if name == MAIN_BUFFER {
            Some(&self.main)
        } else {
            self.buffers.buffer(name)
        }
    }

    fn buffer_mut(&mut self, name: &str) -> &mut LineBuffer {
        if name == MAIN_BUFFER {
            &mut self.main
        } else {
            self.buffers.buffer_mut(name)
        }
    }
}

impl ScriptHost for SearchEngine {
    fn global(&self, name: &str) -> Option<String> {
        self.globals.get(name).cloned()
    }

    fn set_global(&mut self, name: &str, value: String) -> Result<()> {
        self.set_global_variable(name, &value)
    }

    fn call_script(
        &mut self,
        site: &CallSite<'_>,
        name: &str,
        params: Vec<(String, String)>,
    ) -> Result<Outcome> {
        self.ensure_not_running(name)?;
        let resolved = self.resolve_script(site, name)?;
        self.push_script(&resolved, site.line)?;
        let result = self.run_called(&resolved, params);
        self.pop_script();
        result
    }

    fn log(&mut self, level: Level, message: &str) {
        self.logger.log(level, message);
    }

    fn trace(&mut self, event: &TraceEvent) {
        log::trace!("{}:{}: {}", event.script, event.line, event.statement);
        if let Some(trace) = self.trace.as_mut() {
            trace.trace(event);
        }
    }

    fn dir_stack(&mut self) -> &mut Vec<PathBuf> {
        &mut self.dir_stack
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl SearchEngine {
    fn run_called(&mut self, name: &str, params: Vec<(String, String)>) -> Result<Outcome> {
        let mut script = self
            .scripts
            .remove(name)
            .ok_or_else(|| unknown_script(name))?;
        let mut result = Ok(());
        for (key, value) in params {
            if is_global_name(&key) {
                result = self.set_global_variable(&key, &value);
                if result.is_err() {
                    break;
                }
            } else {
                script.set_variable(key, value);
            }
        }
        let outcome = result.and_then(|()| script.run(self));
        self.scripts.insert(name.to_string(), script);
        outcome
    }
}

fn script_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| Error::runtime(format!("no script name in '{}'", path.display())))
}

fn unknown_script(name: &str) -> Error {
    Error::runtime(format!("unknown script '{}'", name))
}
