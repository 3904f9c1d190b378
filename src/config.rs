use crate::defaults;
use crate::error::{GuidecastError, Result};
use crate::language::LanguageCode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionSettings,
    pub bridge: BridgeConfig,
    pub translation: TranslationConfig,
    pub storage: StorageConfig,
    pub voice_isolation: VoiceIsolationConfig,
}

/// Live session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    /// Language listeners hear, e.g. "ja-JP".
    pub target_language: String,
    /// Used when a final utterance arrives before the transcription
    /// service reported its language.
    pub fallback_source_language: Option<String>,
    /// Delay before reporting "no microphone detected" (e.g. "5s").
    pub mic_grace_period: String,
}

/// Audio bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub gain: f32,
    pub max_clip_bytes: u64,
    pub sample_rate: u32,
    pub quantum_ms: u32,
    pub capture_buffer_frames: usize,
}

/// Translation and speech-synthesis service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Per-call timeout (e.g. "15s"). Empty disables the timeout.
    pub timeout: String,
    /// Retry a timed-out call once before giving up on the utterance.
    pub retry_on_timeout: bool,
}

/// Object storage configuration for uploaded clips
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

/// Voice-isolation transform configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceIsolationConfig {
    pub enabled: bool,
    pub model: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            target_language: defaults::DEFAULT_LANGUAGE.to_string(),
            fallback_source_language: None,
            mic_grace_period: humantime::format_duration(defaults::MIC_GRACE_PERIOD).to_string(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            gain: defaults::CLIP_GAIN,
            max_clip_bytes: defaults::MAX_CLIP_BYTES,
            sample_rate: defaults::SAMPLE_RATE,
            quantum_ms: defaults::RENDER_QUANTUM_MS,
            capture_buffer_frames: defaults::CAPTURE_BUFFER_FRAMES,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout: humantime::format_duration(defaults::TRANSLATION_TIMEOUT).to_string(),
            retry_on_timeout: true,
        }
    }
}

impl Default for VoiceIsolationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: defaults::VOICE_ISOLATION_MODEL.to_string(),
        }
    }
}

impl SessionSettings {
    pub fn target_language(&self) -> Result<LanguageCode> {
        LanguageCode::parse(&self.target_language)
    }

    pub fn fallback_source_language(&self) -> Result<Option<LanguageCode>> {
        self.fallback_source_language
            .as_deref()
            .map(LanguageCode::parse)
            .transpose()
    }

    pub fn mic_grace_period(&self) -> Result<Duration> {
        parse_duration("session.mic_grace_period", &self.mic_grace_period)
    }
}

impl BridgeConfig {
    /// Number of samples rendered per quantum.
    pub fn quantum_samples(&self) -> usize {
        (self.sample_rate as usize * self.quantum_ms as usize) / 1000
    }

    pub fn quantum_duration(&self) -> Duration {
        Duration::from_millis(self.quantum_ms as u64)
    }

    /// Reject values the graph cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(GuidecastError::ConfigInvalidValue {
                key: "bridge.gain".to_string(),
                message: format!("must be a positive number, got {}", self.gain),
            });
        }
        if self.sample_rate == 0 {
            return Err(GuidecastError::ConfigInvalidValue {
                key: "bridge.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.quantum_samples() == 0 {
            return Err(GuidecastError::ConfigInvalidValue {
                key: "bridge.quantum_ms".to_string(),
                message: format!(
                    "{}ms is shorter than one sample at {}Hz",
                    self.quantum_ms, self.sample_rate
                ),
            });
        }
        if self.capture_buffer_frames == 0 {
            return Err(GuidecastError::ConfigInvalidValue {
                key: "bridge.capture_buffer_frames".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl TranslationConfig {
    /// Per-call timeout; `None` when the setting is empty.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        if self.timeout.trim().is_empty() {
            return Ok(None);
        }
        parse_duration("translation.timeout", &self.timeout).map(Some)
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| GuidecastError::ConfigInvalidValue {
        key: key.to_string(),
        message: format!("{:?} is not a duration: {}", value, e),
    })
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file yields defaults; invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - GUIDECAST_TARGET_LANGUAGE → session.target_language
    /// - GUIDECAST_TRANSLATION_ENDPOINT → translation.endpoint
    /// - GUIDECAST_TRANSLATION_API_KEY → translation.api_key
    /// - GUIDECAST_STORAGE_ENDPOINT → storage.endpoint
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("GUIDECAST_TARGET_LANGUAGE")
            && !language.is_empty()
        {
            self.session.target_language = language;
        }

        if let Ok(endpoint) = std::env::var("GUIDECAST_TRANSLATION_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.translation.endpoint = Some(endpoint);
        }

        if let Ok(key) = std::env::var("GUIDECAST_TRANSLATION_API_KEY")
            && !key.is_empty()
        {
            self.translation.api_key = Some(key);
        }

        if let Ok(endpoint) = std::env::var("GUIDECAST_STORAGE_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.storage.endpoint = Some(endpoint);
        }

        self
    }

    /// Check every value that has to parse before a session can start.
    pub fn validate(&self) -> Result<()> {
        self.session.target_language()?;
        self.session.fallback_source_language()?;
        self.session.mic_grace_period()?;
        self.bridge.validate()?;
        self.translation.timeout()?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/guidecast/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("guidecast").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_guidecast_env() {
        remove_env("GUIDECAST_TARGET_LANGUAGE");
        remove_env("GUIDECAST_TRANSLATION_ENDPOINT");
        remove_env("GUIDECAST_TRANSLATION_API_KEY");
        remove_env("GUIDECAST_STORAGE_ENDPOINT");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.session.target_language, "en-US");
        assert_eq!(config.session.fallback_source_language, None);
        assert_eq!(
            config.session.mic_grace_period().unwrap(),
            Duration::from_secs(5)
        );

        assert_eq!(config.bridge.gain, 1.2);
        assert_eq!(config.bridge.max_clip_bytes, 20 * 1024 * 1024);
        assert_eq!(config.bridge.sample_rate, 16000);
        assert_eq!(config.bridge.quantum_ms, 20);
        assert_eq!(config.bridge.quantum_samples(), 320);

        assert_eq!(config.translation.endpoint, None);
        assert_eq!(
            config.translation.timeout().unwrap(),
            Some(Duration::from_secs(15))
        );
        assert!(config.translation.retry_on_timeout);

        assert!(config.voice_isolation.enabled);
        assert_eq!(config.voice_isolation.model, "ns_es");

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [session]
            target_language = "ja_jp"
            fallback_source_language = "en-US"
            mic_grace_period = "2s"

            [bridge]
            gain = 1.5
            max_clip_bytes = 1048576
            sample_rate = 48000
            quantum_ms = 10

            [translation]
            endpoint = "https://translate.example.com/speech"
            api_key = "secret"
            timeout = "30s"
            retry_on_timeout = false

            [storage]
            endpoint = "https://clips.example.com"

            [voice_isolation]
            enabled = false
            model = "ns"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.session.target_language().unwrap().as_str(), "ja-JP");
        assert_eq!(
            config.session.fallback_source_language().unwrap(),
            Some(LanguageCode::parse("en-US").unwrap())
        );
        assert_eq!(
            config.session.mic_grace_period().unwrap(),
            Duration::from_secs(2)
        );
        assert_eq!(config.bridge.gain, 1.5);
        assert_eq!(config.bridge.max_clip_bytes, 1_048_576);
        assert_eq!(config.bridge.quantum_samples(), 480);
        assert_eq!(
            config.translation.endpoint.as_deref(),
            Some("https://translate.example.com/speech")
        );
        assert_eq!(
            config.translation.timeout().unwrap(),
            Some(Duration::from_secs(30))
        );
        assert!(!config.translation.retry_on_timeout);
        assert_eq!(
            config.storage.endpoint.as_deref(),
            Some("https://clips.example.com")
        );
        assert!(!config.voice_isolation.enabled);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [session]
            target_language = "ja-JP"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.session.target_language, "ja-JP");
        assert_eq!(config.bridge, BridgeConfig::default());
        assert_eq!(config.translation, TranslationConfig::default());
        assert_eq!(config.voice_isolation, VoiceIsolationConfig::default());
    }

    #[test]
    fn test_empty_timeout_disables_it() {
        let config = TranslationConfig {
            timeout: String::new(),
            ..TranslationConfig::default()
        };
        assert_eq!(config.timeout().unwrap(), None);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let settings = SessionSettings {
            mic_grace_period: "soon".to_string(),
            ..SessionSettings::default()
        };
        match settings.mic_grace_period() {
            Err(GuidecastError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "session.mic_grace_period");
            }
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_bridge_validate_rejects_bad_values() {
        let zero_gain = BridgeConfig {
            gain: 0.0,
            ..BridgeConfig::default()
        };
        assert!(zero_gain.validate().is_err());

        let nan_gain = BridgeConfig {
            gain: f32::NAN,
            ..BridgeConfig::default()
        };
        assert!(nan_gain.validate().is_err());

        let tiny_quantum = BridgeConfig {
            quantum_ms: 0,
            ..BridgeConfig::default()
        };
        assert!(tiny_quantum.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_language() {
        let mut config = Config::default();
        config.session.target_language = "!!".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_target_language() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_guidecast_env();

        set_env("GUIDECAST_TARGET_LANGUAGE", "ja-JP");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.session.target_language, "ja-JP");
        assert_eq!(config.translation.endpoint, None);

        clear_guidecast_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_guidecast_env();

        set_env("GUIDECAST_TARGET_LANGUAGE", "es-US");
        set_env("GUIDECAST_TRANSLATION_ENDPOINT", "http://localhost:9000");
        set_env("GUIDECAST_TRANSLATION_API_KEY", "k");
        set_env("GUIDECAST_STORAGE_ENDPOINT", "http://localhost:9001");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.session.target_language, "es-US");
        assert_eq!(
            config.translation.endpoint.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(config.translation.api_key.as_deref(), Some("k"));
        assert_eq!(
            config.storage.endpoint.as_deref(),
            Some("http://localhost:9001")
        );

        clear_guidecast_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_guidecast_env();

        set_env("GUIDECAST_TARGET_LANGUAGE", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.session.target_language, "en-US");

        clear_guidecast_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [session
            target_language = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_guidecast_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        if let Some(path) = Config::default_path() {
            let path_str = path.to_string_lossy();
            assert!(path_str.contains("guidecast"));
            assert!(path_str.ends_with("config.toml"));
        }
    }
}
