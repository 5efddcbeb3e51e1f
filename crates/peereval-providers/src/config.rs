//! Configuration loading and provider factories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use peereval_core::nlp::{LocalSummarizer, DEFAULT_MAX_SENTENCES};
use peereval_core::report::{ReportOptions, DEFAULT_SUMMARY_CONCURRENCY};
use peereval_core::scoring::{Aggregation, Curve};
use peereval_core::traits::{Mailer, Summarizer};

use crate::openai::OpenAiSummarizer;
use crate::smtp::SmtpMailer;

/// SMTP settings.
///
/// Note: Custom Debug impl masks the password to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_mail_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default = "default_sender")]
    pub sender: String,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("use_tls", &self.use_tls)
            .field("sender", &self.sender)
            .finish()
    }
}

fn default_mail_port() -> u16 {
    587
}
fn default_use_tls() -> bool {
    true
}
fn default_sender() -> String {
    "Peer Eval <no-reply@example.com>".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: default_mail_port(),
            username: None,
            password: None,
            use_tls: default_use_tls(),
            sender: default_sender(),
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl MailConfig {
    /// SMTP delivery needs a server, a username and a password.
    pub fn has_smtp(&self) -> bool {
        present(&self.server) && present(&self.username) && present(&self.password)
    }
}

/// External summarizer settings.
///
/// Note: Custom Debug impl masks the API key.
#[derive(Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_summary_model")]
    pub model: String,
}

impl std::fmt::Debug for SummarizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

fn default_summary_model() -> String {
    "gpt-3.5-turbo".to_string()
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: default_summary_model(),
        }
    }
}

/// Score aggregation and curving for reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// `mean`, `median` or `trimmed_mean`.
    #[serde(default = "default_aggregation")]
    pub aggregation: String,
    /// Fraction trimmed from each tail by `trimmed_mean`.
    #[serde(default = "default_trim_fraction")]
    pub trim_fraction: f64,
    #[serde(default)]
    pub curve: Option<Curve>,
    /// Sentences kept by the local summarizer.
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,
    /// Summarizer calls in flight at once.
    #[serde(default = "default_summary_concurrency")]
    pub summary_concurrency: usize,
}

fn default_aggregation() -> String {
    "mean".to_string()
}
fn default_trim_fraction() -> f64 {
    0.1
}
fn default_max_sentences() -> usize {
    DEFAULT_MAX_SENTENCES
}
fn default_summary_concurrency() -> usize {
    DEFAULT_SUMMARY_CONCURRENCY
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            aggregation: default_aggregation(),
            trim_fraction: default_trim_fraction(),
            curve: None,
            max_sentences: default_max_sentences(),
            summary_concurrency: default_summary_concurrency(),
        }
    }
}

impl ReportConfig {
    /// Resolve into report options, validating the aggregation settings.
    pub fn options(&self) -> Result<ReportOptions> {
        let mut aggregation: Aggregation = self
            .aggregation
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        if let Aggregation::TrimmedMean { fraction } = &mut aggregation {
            if !(0.0..0.5).contains(&self.trim_fraction) {
                anyhow::bail!(
                    "trim_fraction must be in [0, 0.5), got {}",
                    self.trim_fraction
                );
            }
            *fraction = self.trim_fraction;
        }
        if let Some(curve) = &self.curve {
            if !(0.0..=1.0).contains(&curve.k) {
                anyhow::bail!("curve k must be in [0, 1], got {}", curve.k);
            }
        }
        Ok(ReportOptions {
            aggregation,
            curve: self.curve,
            max_sentences: self.max_sentences.max(1),
            summary_concurrency: self.summary_concurrency.max(1),
        })
    }
}

/// Top-level peereval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEvalConfig {
    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Public base URL used in evaluation links.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

fn default_database() -> PathBuf {
    PathBuf::from("./peereval.sqlite")
}
fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

impl Default for PeerEvalConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            base_url: default_base_url(),
            mail: MailConfig::default(),
            summarizer: SummarizerConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

fn resolve_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        *v = resolve_env_vars(v);
    }
}

fn resolve_all(config: &mut PeerEvalConfig) {
    config.database = PathBuf::from(resolve_env_vars(&config.database.to_string_lossy()));
    config.base_url = resolve_env_vars(&config.base_url);
    resolve_opt(&mut config.mail.server);
    resolve_opt(&mut config.mail.username);
    resolve_opt(&mut config.mail.password);
    config.mail.sender = resolve_env_vars(&config.mail.sender);
    resolve_opt(&mut config.summarizer.api_key);
    resolve_opt(&mut config.summarizer.base_url);
}

/// Apply environment overrides. `lookup` returns a variable's value, if set.
fn apply_env_overrides<F>(config: &mut PeerEvalConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL") {
        config.database = PathBuf::from(url.strip_prefix("sqlite:///").unwrap_or(&url));
    }
    if let Some(path) = lookup("PEEREVAL_DATABASE") {
        config.database = PathBuf::from(path);
    }
    if let Some(url) = lookup("PEEREVAL_BASE_URL") {
        config.base_url = url;
    }
    if let Some(server) = lookup("MAIL_SERVER") {
        config.mail.server = Some(server);
    }
    if let Some(port) = lookup("MAIL_PORT") {
        config.mail.port = port
            .trim()
            .parse()
            .with_context(|| format!("MAIL_PORT is not a valid port: {port}"))?;
    }
    if let Some(username) = lookup("MAIL_USERNAME") {
        config.mail.username = Some(username);
    }
    if let Some(password) = lookup("MAIL_PASSWORD") {
        config.mail.password = Some(password);
    }
    if let Some(tls) = lookup("MAIL_USE_TLS") {
        config.mail.use_tls = tls.trim().eq_ignore_ascii_case("true");
    }
    if let Some(sender) = lookup("MAIL_DEFAULT_SENDER") {
        config.mail.sender = sender;
    }
    if let Some(key) = lookup("OPENAI_API_KEY") {
        config.summarizer.api_key = Some(key);
    }
    Ok(())
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `peereval.toml` in the current directory
/// 2. `~/.config/peereval/config.toml`
///
/// Environment variables (`MAIL_*`, `OPENAI_API_KEY`, `PEEREVAL_*`) override
/// file values.
pub fn load_config() -> Result<PeerEvalConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PeerEvalConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("peereval.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => parse_config_file(path)?,
        None => PeerEvalConfig::default(),
    };

    apply_env_overrides(&mut config, |name| {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    })?;
    resolve_all(&mut config);

    tracing::debug!(path = ?config_path, config = ?config, "configuration loaded");
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<PeerEvalConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<PeerEvalConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("peereval"))
}

/// Pick the comment summarizer: the external API when a key is configured,
/// otherwise the in-process extractive summarizer.
pub fn create_summarizer(config: &PeerEvalConfig) -> Result<Box<dyn Summarizer>> {
    match config.summarizer.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(Box::new(OpenAiSummarizer::new(
            key,
            config.summarizer.base_url.clone(),
            &config.summarizer.model,
        )?)),
        _ => Ok(Box::new(LocalSummarizer::new(
            config.report.max_sentences.max(1),
        ))),
    }
}

/// Build the SMTP mailer, or `None` when mail is not configured.
pub fn create_mailer(config: &MailConfig) -> Result<Option<Box<dyn Mailer>>> {
    if !config.has_smtp() {
        return Ok(None);
    }
    let mailer = SmtpMailer::from_config(config).context("invalid mail configuration")?;
    Ok(Some(Box::new(mailer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_PEEREVAL_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_PEEREVAL_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_PEEREVAL_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("no refs"), "no refs");
        assert_eq!(resolve_env_vars("${_PEEREVAL_UNSET_VAR_XYZ}"), "");
        std::env::remove_var("_PEEREVAL_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = PeerEvalConfig::default();
        assert_eq!(config.database, PathBuf::from("./peereval.sqlite"));
        assert_eq!(config.base_url, "http://localhost:5000");
        assert_eq!(config.mail.port, 587);
        assert!(config.mail.use_tls);
        assert_eq!(config.mail.sender, "Peer Eval <no-reply@example.com>");
        assert_eq!(config.summarizer.model, "gpt-3.5-turbo");
        assert!(!config.mail.has_smtp());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
database = "data/eval.sqlite"
base_url = "https://eval.example.edu"

[mail]
server = "smtp.example.edu"
port = 2525
username = "mailer"
password = "secret"
use_tls = false

[summarizer]
api_key = "sk-test"
model = "gpt-4o-mini"

[report]
aggregation = "trimmed_mean"
trim_fraction = 0.2
summary_concurrency = 2

[report.curve]
protect_threshold = 85
"#;
        let config: PeerEvalConfig = toml::from_str(toml_str).unwrap();
        assert!(config.mail.has_smtp());
        assert_eq!(config.mail.port, 2525);
        assert_eq!(config.summarizer.model, "gpt-4o-mini");

        let options = config.report.options().unwrap();
        assert_eq!(options.aggregation, Aggregation::TrimmedMean { fraction: 0.2 });
        assert_eq!(options.summary_concurrency, 2);
        let curve = options.curve.unwrap();
        assert_eq!(curve.protect_threshold, 85.0);
        assert_eq!(curve.k, 0.5);
    }

    #[test]
    fn env_overrides_win() {
        let mut config = PeerEvalConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("MAIL_SERVER", "smtp.example.com"),
                ("MAIL_PORT", "465"),
                ("MAIL_USERNAME", "u"),
                ("MAIL_PASSWORD", "p"),
                ("MAIL_USE_TLS", "False"),
                ("OPENAI_API_KEY", "sk-env"),
                ("PEEREVAL_BASE_URL", "https://peer.example.com"),
            ]),
        )
        .unwrap();
        assert!(config.mail.has_smtp());
        assert_eq!(config.mail.port, 465);
        assert!(!config.mail.use_tls);
        assert_eq!(config.summarizer.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.base_url, "https://peer.example.com");
    }

    #[test]
    fn database_url_accepts_sqlite_scheme() {
        let mut config = PeerEvalConfig::default();
        apply_env_overrides(&mut config, env(&[("DATABASE_URL", "sqlite:///tmp/pe.sqlite")])).unwrap();
        assert_eq!(config.database, PathBuf::from("tmp/pe.sqlite"));

        apply_env_overrides(&mut config, env(&[("PEEREVAL_DATABASE", "other.sqlite")])).unwrap();
        assert_eq!(config.database, PathBuf::from("other.sqlite"));
    }

    #[test]
    fn bad_port_is_an_error() {
        let mut config = PeerEvalConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("MAIL_PORT", "smtp")])).unwrap_err();
        assert!(err.to_string().contains("MAIL_PORT"));
    }

    #[test]
    fn smtp_requires_all_credentials() {
        let mail = MailConfig {
            server: Some("smtp.example.com".into()),
            username: Some("user".into()),
            password: Some("  ".into()),
            ..Default::default()
        };
        assert!(!mail.has_smtp());
        assert!(create_mailer(&mail).unwrap().is_none());
    }

    #[test]
    fn debug_masks_secrets() {
        let config = PeerEvalConfig {
            mail: MailConfig {
                password: Some("hunter2".into()),
                ..Default::default()
            },
            summarizer: SummarizerConfig {
                api_key: Some("sk-very-secret".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn invalid_report_settings_rejected() {
        let report = ReportConfig {
            aggregation: "mode".into(),
            ..Default::default()
        };
        assert!(report.options().is_err());

        let report = ReportConfig {
            aggregation: "trimmed_mean".into(),
            trim_fraction: 0.6,
            ..Default::default()
        };
        assert!(report.options().is_err());
    }

    #[test]
    fn summarizer_selection() {
        let config = PeerEvalConfig::default();
        assert_eq!(create_summarizer(&config).unwrap().name(), "local");

        let config = PeerEvalConfig {
            summarizer: SummarizerConfig {
                api_key: Some("sk-test".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(create_summarizer(&config).unwrap().name(), "openai");
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peereval.toml");
        std::fs::write(&path, "base_url = \"https://from-file.example\"\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.mail.port, default_mail_port());
        // PEEREVAL_BASE_URL may be set in the environment running the tests
        if std::env::var("PEEREVAL_BASE_URL").is_err() {
            assert_eq!(config.base_url, "https://from-file.example");
        }

        assert!(load_config_from(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
