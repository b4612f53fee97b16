use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use clap::{ArgAction, Parser, Subcommand};

use crate::health::ServiceTable;
use crate::model::ServiceKey;
use crate::session::{ClientConfig, DEFAULT_ORIGIN};

/// Command-line options for the detection client.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Detection backend dispatch client", long_about = None)]
pub struct CliArgs {
    /// Origin serving `/api/v1` and the `/ai-detect` and `/rumor` proxies.
    #[arg(long = "origin", env = "DETECT_ORIGIN", default_value = DEFAULT_ORIGIN, global = true)]
    pub origin: String,

    /// Timeout (seconds) for API and proxied requests.
    #[arg(long = "timeout", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=300), global = true)]
    timeout_secs: u64,

    /// Timeout (seconds) for video uploads.
    #[arg(long = "video-timeout", default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..=1800), global = true)]
    video_timeout_secs: u64,

    /// Timeout (seconds) for each health probe.
    #[arg(long = "probe-timeout", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=60), global = true)]
    probe_timeout_secs: u64,

    /// CSRF token sent as `X-CSRFToken` on API requests.
    #[arg(long = "csrf-token", env = "DETECT_CSRF_TOKEN", global = true)]
    pub csrf_token: Option<String>,

    /// Read the CSRF token from the origin page's `csrf-token` meta tag.
    #[arg(long = "page-csrf", action = ArgAction::SetTrue, global = true)]
    pub page_csrf: bool,

    /// Enable a health probe for a service, e.g. `rumor_detection=/rumor/health`.
    #[arg(long = "probe", value_name = "KEY=PATH", value_parser = parse_probe, global = true)]
    pub probes: Vec<ProbeOverride>,

    /// Disable the health probe of a service.
    #[arg(long = "no-probe", value_name = "KEY", global = true)]
    pub disabled_probes: Vec<ServiceKey>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check whether an image is AI-generated.
    Image {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Fetch a stored AI-image detection.
    ImageResult { detection_id: String },
    /// Check a text and image pair for rumors.
    Rumor {
        /// Text of the post to check.
        #[arg(long = "text", conflicts_with = "text_file", required_unless_present = "text_file")]
        text: Option<String>,
        /// Read the post text from a file.
        #[arg(long = "text-file", value_name = "PATH")]
        text_file: Option<PathBuf>,
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
    /// Analyze a video with module 1 or 2.
    Video {
        #[arg(long = "module", value_parser = clap::value_parser!(u8).range(1..=2))]
        module: u8,
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// List module status from the API.
    Modules,
    /// Fetch any stored detection.
    Result { detection_id: String },
    /// Print the composite health of every detection backend.
    Status,
    /// Serve `/health` and `/services/status` over HTTP.
    Serve {
        #[arg(long = "listen", value_name = "ADDR")]
        listen: Option<String>,
    },
}

/// `KEY=PATH` pair enabling one service's health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOverride {
    pub key: ServiceKey,
    pub path: String,
}

fn parse_probe(raw: &str) -> std::result::Result<ProbeOverride, String> {
    let (key, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=PATH, got `{raw}`"))?;
    let key = key.trim().parse::<ServiceKey>()?;
    let path = path.trim();
    if !path.starts_with('/') {
        return Err(format!("probe path `{path}` must start with `/`"));
    }
    Ok(ProbeOverride {
        key,
        path: path.to_owned(),
    })
}

impl CliArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Convert CLI arguments into the client configuration.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.origin.clone());
        config.timeout = self.timeout();
        config.video_timeout = Duration::from_secs(self.video_timeout_secs);
        config.probe_timeout = Duration::from_secs(self.probe_timeout_secs);
        config.csrf_token = self.csrf_token.clone();
        config
    }

    /// Default service table with the probe overrides applied.
    pub fn service_table(&self) -> ServiceTable {
        let mut table = ServiceTable::default();
        for probe in &self.probes {
            table.set_probe(probe.key, Some(probe.path.clone()));
        }
        for key in &self.disabled_probes {
            table.set_probe(*key, None);
        }
        table
    }
}

/// Resolve the rumor text from `--text` or `--text-file`.
pub fn resolve_text(text: Option<&str>, text_file: Option<&PathBuf>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text.to_owned());
    }
    if let Some(path) = text_file {
        return fs::read_to_string(path)
            .with_context(|| format!("reading text file {}", path.display()));
    }
    Err(anyhow!("rumor detection needs --text or --text-file"))
}
