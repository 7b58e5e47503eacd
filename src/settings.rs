use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dsl::bytecode::DEFAULT_SEPARATOR;
use crate::error::AppError;

/// Execution settings, read from a JSON file and overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Wall-clock budget per execution; 0 disables the limit.
    pub time_limit_ms: u64,
    pub separator: String,
    /// Print `Write`/`WriteLn` output after a run.
    pub echo_output: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            time_limit_ms: 1000,
            separator: DEFAULT_SEPARATOR.to_string(),
            echo_output: true,
        }
    }
}

impl RunSettings {
    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }
}

/// Load settings from `path`. A missing file yields the defaults; a file
/// that exists but does not parse is an error.
pub fn load_settings(path: &Path) -> Result<RunSettings, AppError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(RunSettings::default());
    }
    let data = std::fs::read_to_string(path)?;
    let settings: RunSettings = serde_json::from_str(&data)?;
    crate::dsl::bytecode::check_separator(&settings.separator)?;
    Ok(settings)
}

/// Write settings as pretty JSON.
pub fn save_settings(path: &Path, settings: &RunSettings) -> Result<(), AppError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
