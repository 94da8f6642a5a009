use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(LogFormat::Compact),
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub export_file_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_level: "info".into(),
            log_format: LogFormat::Compact,
            export_file_name: "student-info.json".into(),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads `RESULTD_*` variables. Bad values
    /// fall back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Config {
            workspace: non_empty("RESULTD_WORKSPACE").map(PathBuf::from),
            log_level: non_empty("RESULTD_LOG").unwrap_or(defaults.log_level),
            log_format: non_empty("RESULTD_LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            export_file_name: non_empty("RESULTD_EXPORT_FILE")
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.export_file_name),
        }
    }
}
