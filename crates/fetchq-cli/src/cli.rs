use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fetchq::{ContentFormat, ContentOptions, JobConfig, RequestOptions};

#[derive(Clone, Debug, Parser)]
#[command(name = "fetchq", version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
pub struct App {
    /// URLs to fetch; each becomes one queued job.
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// TOML file with queue defaults (`max_concurrents`, `max_attempts`).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(short = 'j', long, value_name = "N")]
    pub max_concurrents: Option<usize>,

    #[arg(short = 'a', long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Per-attempt deadline in milliseconds.
    #[arg(short, long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Entity tag from a previous fetch; sent as `If-None-Match`.
    #[arg(short, long)]
    pub etag: Option<String>,

    /// Return bodies base64-encoded instead of decoded.
    #[arg(long)]
    pub base64: bool,

    /// Accept invalid certificates on https URLs.
    #[arg(long = "insecure-https")]
    pub insecure_https: bool,

    /// Extra request header, repeatable.
    #[arg(short = 'H', long = "header", value_name = "KEY:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

impl App {
    /// Queue defaults: the config file, if any, overridden by flags.
    pub fn job_config(&self) -> Result<JobConfig> {
        let file = match &self.config {
            Some(path) => load_config(path)?,
            None => JobConfig::default(),
        };

        let flags = JobConfig {
            max_concurrents: self.max_concurrents,
            max_attempts: self.max_attempts,
        };
        Ok(file.merge(&flags))
    }

    pub fn request_options(&self) -> RequestOptions {
        self.headers
            .iter()
            .fold(RequestOptions::default(), |options, (key, value)| options.header(key, value))
    }

    pub fn content_options(&self) -> ContentOptions {
        let mut options = ContentOptions::default();
        if let Some(etag) = &self.etag {
            options = options.validator(etag);
        }
        if let Some(ms) = self.timeout_ms {
            options = options.timeout(Duration::from_millis(ms));
        }
        if self.base64 {
            options = options.format(ContentFormat::Base64);
        }
        options
    }
}

fn load_config(path: &Path) -> Result<JobConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected KEY:VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("Accept: text/html"), Ok(("Accept".into(), "text/html".into())));
        assert_eq!(parse_header("X-Ratio:1:2"), Ok(("X-Ratio".into(), "1:2".into())));
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(" : v").is_err());
    }

    #[test]
    fn test_flags_build_options() {
        let app = App::parse_from([
            "fetchq",
            "--etag",
            "\"v1\"",
            "--timeout-ms",
            "250",
            "--base64",
            "-H",
            "Accept: */*",
            "https://example.com/a",
        ]);

        let content = app.content_options();
        assert_eq!(content.validator.as_deref(), Some("\"v1\""));
        assert_eq!(content.timeout, Some(Duration::from_millis(250)));
        assert_eq!(content.format, ContentFormat::Base64);
        assert_eq!(app.request_options().headers, vec![("Accept".to_string(), "*/*".to_string())]);
        assert_eq!(app.urls, vec!["https://example.com/a"]);
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("fetchq-cli-{}.toml", std::process::id()));
        std::fs::write(&path, "max_concurrents = 2\nmaxAttempts = 5\n").unwrap();

        let app = App::parse_from([
            "fetchq".to_string(),
            "--config".to_string(),
            path.display().to_string(),
            "--max-concurrents".to_string(),
            "8".to_string(),
            "http://a".to_string(),
        ]);
        let config = app.job_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config, JobConfig::default().max_concurrents(8).max_attempts(5));
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let app = App::parse_from(["fetchq", "--config", "/nonexistent/fetchq.toml", "http://a"]);
        let err = app.job_config().unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
