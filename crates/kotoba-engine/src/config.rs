use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::prompts::TaskKind;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TRANSPORT_RETRIES: usize = 1;
pub const DEFAULT_RETRY_BACKOFF_S: f64 = 1.2;

const TIMEOUT_MIN_MS: f64 = 100.0;
const TIMEOUT_MAX_MS: f64 = 300_000.0;

/// A Gemini API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTimeouts {
    pub chat: Duration,
    pub lookup: Duration,
    pub recognize: Duration,
    pub translate: Duration,
    pub vocabulary: Duration,
    pub kanji_image: Duration,
}

impl Default for TaskTimeouts {
    fn default() -> Self {
        Self {
            chat: Duration::from_secs(15),
            lookup: Duration::from_secs(10),
            recognize: Duration::from_secs(30),
            translate: Duration::from_secs(15),
            vocabulary: Duration::from_secs(20),
            kanji_image: Duration::from_secs(30),
        }
    }
}

impl TaskTimeouts {
    pub fn for_task(&self, task: TaskKind) -> Duration {
        match task {
            TaskKind::Chat => self.chat,
            TaskKind::Lookup => self.lookup,
            TaskKind::Recognize => self.recognize,
            TaskKind::Translate => self.translate,
            TaskKind::Vocabulary => self.vocabulary,
            TaskKind::KanjiImage => self.kanji_image,
        }
    }

    pub fn set(&mut self, task: TaskKind, timeout: Duration) {
        let slot = match task {
            TaskKind::Chat => &mut self.chat,
            TaskKind::Lookup => &mut self.lookup,
            TaskKind::Recognize => &mut self.recognize,
            TaskKind::Translate => &mut self.translate,
            TaskKind::Vocabulary => &mut self.vocabulary,
            TaskKind::KanjiImage => &mut self.kanji_image,
        };
        *slot = timeout;
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: Option<ApiKey>,
    pub api_base: String,
    pub timeouts: TaskTimeouts,
    pub transport_retries: usize,
    pub retry_backoff: Duration,
    pub dryrun: bool,
    pub events_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            timeouts: TaskTimeouts::default(),
            transport_retries: DEFAULT_TRANSPORT_RETRIES,
            retry_backoff: Duration::from_secs_f64(DEFAULT_RETRY_BACKOFF_S),
            dryrun: false,
            events_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key/value source; out-of-range numbers are
    /// clamped rather than rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let mut timeouts = TaskTimeouts::default();
        for task in TaskKind::ALL {
            let key = format!("KOTOBA_TIMEOUT_{}_MS", task.env_suffix());
            let default_ms = timeouts.for_task(task).as_millis() as f64;
            let ms = value_as_f64(value(&key).as_deref(), default_ms, TIMEOUT_MIN_MS, TIMEOUT_MAX_MS);
            timeouts.set(task, Duration::from_millis(ms.round() as u64));
        }

        Self {
            api_key: value("GEMINI_API_KEY")
                .or_else(|| value("GOOGLE_API_KEY"))
                .and_then(|raw| ApiKey::new(&raw)),
            api_base: value("GEMINI_API_BASE")
                .map(|raw| raw.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeouts,
            transport_retries: value_as_f64(
                value("KOTOBA_TRANSPORT_RETRIES").as_deref(),
                DEFAULT_TRANSPORT_RETRIES as f64,
                0.0,
                4.0,
            )
            .round() as usize,
            retry_backoff: Duration::from_secs_f64(value_as_f64(
                value("KOTOBA_RETRY_BACKOFF").as_deref(),
                DEFAULT_RETRY_BACKOFF_S,
                0.1,
                10.0,
            )),
            dryrun: value("KOTOBA_DRYRUN")
                .map(|raw| matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false),
            events_path: value("KOTOBA_EVENTS_PATH").map(PathBuf::from),
        }
    }
}

fn value_as_f64(value: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    value
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|parsed| parsed.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{ApiKey, EngineConfig, DEFAULT_API_BASE};
    use crate::prompts::TaskKind;

    fn config_from(pairs: &[(&str, &str)]) -> EngineConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_task_budgets() {
        let config = config_from(&[]);
        assert_eq!(config.api_key, None);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.timeouts.for_task(TaskKind::Chat), Duration::from_secs(15));
        assert_eq!(config.timeouts.for_task(TaskKind::Lookup), Duration::from_secs(10));
        assert_eq!(config.timeouts.for_task(TaskKind::Recognize), Duration::from_secs(30));
        assert_eq!(config.transport_retries, 1);
        assert!(!config.dryrun);
    }

    #[test]
    fn env_values_are_trimmed_and_clamped() {
        let config = config_from(&[
            ("GOOGLE_API_KEY", "  AIza-test  "),
            ("GEMINI_API_BASE", "http://localhost:8080/v1beta/"),
            ("KOTOBA_TIMEOUT_CHAT_MS", "2500"),
            ("KOTOBA_TIMEOUT_RECOGNIZE_MS", "999999999"),
            ("KOTOBA_TIMEOUT_LOOKUP_MS", "soon"),
            ("KOTOBA_TRANSPORT_RETRIES", "9"),
            ("KOTOBA_RETRY_BACKOFF", "0.01"),
            ("KOTOBA_DRYRUN", "true"),
        ]);
        assert_eq!(config.api_key.as_ref().map(ApiKey::expose), Some("AIza-test"));
        assert_eq!(config.api_base, "http://localhost:8080/v1beta");
        assert_eq!(config.timeouts.chat, Duration::from_millis(2500));
        assert_eq!(config.timeouts.recognize, Duration::from_secs(300));
        assert_eq!(config.timeouts.lookup, Duration::from_secs(10));
        assert_eq!(config.transport_retries, 4);
        assert!((config.retry_backoff.as_secs_f64() - 0.1).abs() < 1e-6);
        assert!(config.dryrun);
    }

    #[test]
    fn gemini_key_wins_over_google_key() {
        let config = config_from(&[("GEMINI_API_KEY", "primary"), ("GOOGLE_API_KEY", "secondary")]);
        assert_eq!(config.api_key.as_ref().map(ApiKey::expose), Some("primary"));
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("AIza-secret").unwrap();
        assert_eq!(format!("{key:?}"), "ApiKey(<redacted>)");
        assert!(!format!("{:?}", config_from(&[("GEMINI_API_KEY", "AIza-secret")])).contains("AIza"));
        assert_eq!(ApiKey::new("   "), None);
    }
}
