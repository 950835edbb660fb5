use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::{ANTHROPIC_API_URL, DEFAULT_MODEL};

/// Application configuration loaded from environment variables.
/// Every recognised option is an explicit field; values are validated at load time.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: Secret,
    pub llm_api_url: String,
    pub llm_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
    pub drafts_dir: PathBuf,
    /// Every rendered export is also kept under `<exports_dir>/<owner>/`.
    pub exports_dir: PathBuf,
    /// Privacy flag applied when a request does not set one.
    pub privacy_mode_default: bool,
    pub generation: GenerationConfig,
    pub quality: QualityConfig,
    pub export: ExportConfig,
}

/// A credential that never shows up in logs or debug output.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Model parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// Bounded retry schedule applied around each generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the given retry (1-based): base, 2×base, 4×base … capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// One call per section.
    PerSection,
    /// One call for the whole proposal, split into sections; gaps filled per section.
    SinglePass,
}

impl FromStr for GenerationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_section" | "per-section" => Ok(GenerationMode::PerSection),
            "single_pass" | "single-pass" => Ok(GenerationMode::SinglePass),
            other => bail!("unknown generation mode '{other}' (expected per_section or single_pass)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub params: GenerationParams,
    pub mode: GenerationMode,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Transcript excerpt bound, in characters; the most recent characters are kept.
    pub transcript_max_chars: usize,
    pub summarize_transcript: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            params: GenerationParams::default(),
            mode: GenerationMode::PerSection,
            concurrency: 4,
            retry: RetryPolicy::default(),
            transcript_max_chars: 6000,
            summarize_transcript: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityWeights {
    pub length: f64,
    pub coverage: f64,
    pub tone: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            length: 0.4,
            coverage: 0.4,
            tone: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityConfig {
    pub weights: QualityWeights,
    /// Grades below this produce suggestions and `passed = false`.
    pub pass_threshold: u32,
    pub min_section_chars: usize,
    pub max_goal_keywords: usize,
    pub extra_forbidden_phrases: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            pass_threshold: 70,
            min_section_chars: 300,
            max_goal_keywords: 8,
            extra_forbidden_phrases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfEngine {
    /// In-process renderer.
    Builtin,
    /// External `wkhtmltopdf` fed the HTML rendition.
    Wkhtmltopdf { binary: PathBuf },
}

/// Styling shared by every renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportStyle {
    /// `#rrggbb`
    pub accent_color: String,
    pub body_font_size_pt: f32,
    pub font_family: String,
}

impl ExportStyle {
    /// Accent colour as 0..=1 RGB components.
    pub fn accent_rgb(&self) -> (f32, f32, f32) {
        let hex = self.accent_color.trim_start_matches('#');
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .map(|v| v as f32 / 255.0)
                .unwrap_or(0.0)
        };
        (channel(0..2), channel(2..4), channel(4..6))
    }
}

impl Default for ExportStyle {
    fn default() -> Self {
        Self {
            accent_color: "#0b3d91".to_string(),
            body_font_size_pt: 11.0,
            font_family: "\"Segoe UI\", Roboto, Arial, sans-serif".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub pdf_engine: PdfEngine,
    /// Use the built-in PDF renderer when the configured engine is unavailable.
    pub pdf_fallback: bool,
    pub style: ExportStyle,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pdf_engine: PdfEngine::Builtin,
            pdf_fallback: true,
            style: ExportStyle::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let params = GenerationParams {
            model: env.string_or("LLM_MODEL", DEFAULT_MODEL),
            temperature: env.parse_or("LLM_TEMPERATURE", 0.3)?,
            max_tokens: env.parse_or("LLM_MAX_TOKENS", 2000)?,
        };

        let retry = RetryPolicy {
            max_attempts: env.parse_or("RETRY_MAX_ATTEMPTS", 3)?,
            base_delay: Duration::from_millis(env.parse_or("RETRY_BASE_DELAY_MS", 1000)?),
            max_delay: Duration::from_millis(env.parse_or("RETRY_MAX_DELAY_MS", 8000)?),
        };

        let generation = GenerationConfig {
            params,
            mode: env.parse_or("GENERATION_MODE", GenerationMode::PerSection)?,
            concurrency: env.parse_or("GENERATION_CONCURRENCY", 4)?,
            retry,
            transcript_max_chars: env.parse_or("TRANSCRIPT_MAX_CHARS", 6000)?,
            summarize_transcript: env.flag_or("SUMMARIZE_TRANSCRIPT", true)?,
        };

        let quality = QualityConfig {
            weights: QualityWeights {
                length: env.parse_or("QUALITY_WEIGHT_LENGTH", 0.4)?,
                coverage: env.parse_or("QUALITY_WEIGHT_COVERAGE", 0.4)?,
                tone: env.parse_or("QUALITY_WEIGHT_TONE", 0.2)?,
            },
            pass_threshold: env.parse_or("QUALITY_THRESHOLD", 70)?,
            min_section_chars: env.parse_or("QUALITY_MIN_SECTION_CHARS", 300)?,
            max_goal_keywords: env.parse_or("QUALITY_MAX_GOAL_KEYWORDS", 8)?,
            extra_forbidden_phrases: env
                .string_or("QUALITY_FORBIDDEN_PHRASES", "")
                .split(',')
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        };

        let pdf_engine = match env.string_or("PDF_ENGINE", "builtin").to_ascii_lowercase().as_str() {
            "builtin" => PdfEngine::Builtin,
            "wkhtmltopdf" => PdfEngine::Wkhtmltopdf {
                binary: PathBuf::from(env.string_or("WKHTMLTOPDF_PATH", "wkhtmltopdf")),
            },
            other => bail!("PDF_ENGINE must be 'builtin' or 'wkhtmltopdf', got '{other}'"),
        };

        let export = ExportConfig {
            pdf_engine,
            pdf_fallback: env.flag_or("PDF_FALLBACK", true)?,
            style: ExportStyle {
                accent_color: env.string_or("EXPORT_ACCENT_COLOR", "#0b3d91"),
                body_font_size_pt: env.parse_or("EXPORT_BODY_FONT_SIZE", 11.0)?,
                ..ExportStyle::default()
            },
        };

        let config = Config {
            anthropic_api_key: Secret::new(env.require("ANTHROPIC_API_KEY")?),
            llm_api_url: env.string_or("LLM_API_URL", ANTHROPIC_API_URL),
            llm_timeout: Duration::from_secs(env.parse_or("LLM_TIMEOUT_SECS", 120)?),
            port: env
                .parse_or("PORT", 8080u16)
                .context("PORT must be a valid port number")?,
            rust_log: env.string_or("RUST_LOG", "info"),
            drafts_dir: PathBuf::from(env.string_or("DRAFTS_DIR", "data/drafts")),
            exports_dir: PathBuf::from(env.string_or("EXPORTS_DIR", "data/exports")),
            privacy_mode_default: env.flag_or("PRIVACY_MODE_DEFAULT", false)?,
            generation,
            quality,
            export,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let g = &self.generation;
        if !(0.0..=1.0).contains(&g.params.temperature) {
            bail!("LLM_TEMPERATURE must be between 0.0 and 1.0");
        }
        if g.params.max_tokens == 0 {
            bail!("LLM_MAX_TOKENS must be greater than zero");
        }
        if g.params.model.trim().is_empty() {
            bail!("LLM_MODEL cannot be empty");
        }
        if g.concurrency == 0 {
            bail!("GENERATION_CONCURRENCY must be at least 1");
        }
        if g.retry.max_attempts == 0 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if g.retry.base_delay > g.retry.max_delay {
            bail!("RETRY_BASE_DELAY_MS cannot exceed RETRY_MAX_DELAY_MS");
        }
        if g.transcript_max_chars == 0 {
            bail!("TRANSCRIPT_MAX_CHARS must be greater than zero");
        }

        let q = &self.quality;
        let w = &q.weights;
        if [w.length, w.coverage, w.tone].iter().any(|v| !v.is_finite() || *v < 0.0) {
            bail!("quality weights must be finite and non-negative");
        }
        if w.length + w.coverage + w.tone <= 0.0 {
            bail!("quality weights must not all be zero");
        }
        if q.pass_threshold > 100 {
            bail!("QUALITY_THRESHOLD must be between 0 and 100");
        }
        if q.min_section_chars == 0 {
            bail!("QUALITY_MIN_SECTION_CHARS must be greater than zero");
        }

        let style = &self.export.style;
        let hex = style.accent_color.strip_prefix('#').unwrap_or("");
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("EXPORT_ACCENT_COLOR must look like #rrggbb");
        }
        if !(6.0..=24.0).contains(&style.body_font_size_pt) {
            bail!("EXPORT_BODY_FONT_SIZE must be between 6 and 24 points");
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_tests(drafts_dir: PathBuf) -> Self {
        use std::collections::HashMap;

        let mut values = HashMap::new();
        values.insert("ANTHROPIC_API_KEY", "test-key".to_string());
        values.insert("DRAFTS_DIR", drafts_dir.display().to_string());
        values.insert("EXPORTS_DIR", drafts_dir.join("exports").display().to_string());
        let mut config = Self::from_lookup(|k| values.get(k).cloned())
            .expect("test configuration is valid");
        config.generation.retry = RetryPolicy::immediate(2);
        config
    }
}

struct Lookup<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Lookup<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}")),
            None => Ok(default),
        }
    }

    fn flag_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => bail!("{key} must be a boolean, got '{v}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| values.get(k).cloned())
    }

    #[test]
    fn test_defaults_with_only_api_key() {
        let config = load(&[("ANTHROPIC_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.generation.params.model, DEFAULT_MODEL);
        assert_eq!(config.generation.mode, GenerationMode::PerSection);
        assert_eq!(config.quality.pass_threshold, 70);
        assert_eq!(config.export.pdf_engine, PdfEngine::Builtin);
        assert!(!config.privacy_mode_default);
        assert_eq!(config.exports_dir, PathBuf::from("data/exports"));
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_temperature_out_of_range_is_rejected() {
        assert!(load(&[("ANTHROPIC_API_KEY", "k"), ("LLM_TEMPERATURE", "1.5")]).is_err());
    }

    #[test]
    fn test_zero_weights_are_rejected() {
        let result = load(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("QUALITY_WEIGHT_LENGTH", "0"),
            ("QUALITY_WEIGHT_COVERAGE", "0"),
            ("QUALITY_WEIGHT_TONE", "0"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_wkhtmltopdf_engine_uses_configured_path() {
        let config = load(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("PDF_ENGINE", "wkhtmltopdf"),
            ("WKHTMLTOPDF_PATH", "/opt/bin/wkhtmltopdf"),
            ("PDF_FALLBACK", "false"),
        ])
        .unwrap();
        assert_eq!(
            config.export.pdf_engine,
            PdfEngine::Wkhtmltopdf {
                binary: PathBuf::from("/opt/bin/wkhtmltopdf")
            }
        );
        assert!(!config.export.pdf_fallback);
    }

    #[test]
    fn test_bad_boolean_is_rejected() {
        assert!(load(&[("ANTHROPIC_API_KEY", "k"), ("PRIVACY_MODE_DEFAULT", "maybe")]).is_err());
    }

    #[test]
    fn test_forbidden_phrases_are_split_and_lowercased() {
        let config = load(&[
            ("ANTHROPIC_API_KEY", "k"),
            ("QUALITY_FORBIDDEN_PHRASES", "Game Changer, ,Rockstar"),
        ])
        .unwrap();
        assert_eq!(
            config.quality.extra_forbidden_phrases,
            vec!["game changer".to_string(), "rockstar".to_string()]
        );
    }

    #[test]
    fn test_api_key_is_redacted_in_debug_output() {
        let config = load(&[("ANTHROPIC_API_KEY", "sk-very-secret")]).unwrap();
        assert!(!format!("{config:?}").contains("sk-very-secret"));
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(8000));
    }

    #[test]
    fn test_accent_rgb_parses_hex() {
        let style = ExportStyle {
            accent_color: "#ff0000".to_string(),
            ..ExportStyle::default()
        };
        assert_eq!(style.accent_rgb(), (1.0, 0.0, 0.0));
    }
}
