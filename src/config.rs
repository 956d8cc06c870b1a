//! Engine configuration.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

/// Environment variable with extra script directories.
pub const SCRIPT_PATH_VAR: &str = "SES_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Searched by `call` after the calling script's directory and the
    /// working directory.
    pub script_dirs: Vec<PathBuf>,
    /// Extension tried when a called script is named without one.
    pub script_extension: String,
    /// Abort a `while` loop after this many iterations.
    pub max_loop_iterations: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            script_dirs: Vec::new(),
            script_extension: "ses".to_string(),
            max_loop_iterations: None,
        }
    }
}

impl EngineConfig {
    /// Defaults plus the directories from `SES_PATH` and the user's
    /// configuration directory.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(paths) = env::var_os(SCRIPT_PATH_VAR) {
            config.script_dirs.extend(env::split_paths(&paths));
        }
        if let Some(dir) = dirs::config_dir().map(|dir| dir.join("sesknife").join("scripts")) {
            if dir.is_dir() {
                config.script_dirs.push(dir);
            }
        }
        config
    }
}
