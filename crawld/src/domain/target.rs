//! Target domain type
//!
//! A Target is a configured URL subject to periodic crawling. Targets are
//! keyed by their normalized URL; re-registering the same URL overwrites the
//! crawl configuration but preserves crawl history.

use crawlstore::{IndexValue, Record, now_ms};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from target registration
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Kind of URL being crawled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[default]
    Website,
    RssFeed,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Website => write!(f, "website"),
            Self::RssFeed => write!(f, "rss_feed"),
        }
    }
}

impl std::str::FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "website" => Ok(Self::Website),
            "rss_feed" | "rss-feed" | "rss" => Ok(Self::RssFeed),
            _ => Err(format!("Unknown target type: {}. Use: website or rss_feed", s)),
        }
    }
}

/// Normalize a target URL: trim whitespace and default the scheme to https
/// when none is given. The normalized string is the target's identity.
pub fn normalize_url(raw: &str) -> Result<String, TargetError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TargetError::InvalidUrl {
            url: raw.to_string(),
            reason: "empty URL".to_string(),
        });
    }

    let lower = trimmed.to_lowercase();
    let normalized = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    // Validate without rewriting: the normalized string stays the identity
    url::Url::parse(&normalized).map_err(|e| TargetError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    Ok(normalized)
}

/// Configuration supplied when registering a target. Limits of 0 mean "use
/// the crawler's default limit"; an empty file-type list means "all types";
/// a crawl interval of 0 means the target is never auto-dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,
    #[serde(default)]
    pub target_type: TargetType,
    #[serde(default)]
    pub max_requests: u32,
    #[serde(default)]
    pub max_files: u32,
    #[serde(default = "default_true")]
    pub download_files: bool,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub ignore_robots_txt: bool,
    #[serde(default)]
    pub crawl_interval_hours: u32,
}

fn default_true() -> bool {
    true
}

/// A registered crawl target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Normalized URL, the target's sole identity
    pub url: String,

    /// Kind of URL being crawled
    pub target_type: TargetType,

    /// Sitemap URLs discovered by the worker
    pub sitemaps: Vec<String>,

    /// Maximum requests per crawl (0 = crawler default)
    pub max_requests: u32,

    /// Maximum files to download per crawl (0 = crawler default)
    pub max_files: u32,

    /// Whether the worker should download files
    pub download_files: bool,

    /// File extensions to download (empty = all types)
    pub file_types: Vec<String>,

    /// Skip robots.txt rules
    pub ignore_robots_txt: bool,

    /// Schedule a crawl every N hours (0 = manual only)
    pub crawl_interval_hours: u32,

    /// Job id of the last job that reached Succeeded or Failed
    pub last_finished_job_id: Option<String>,

    /// Job id (or dispatch claim) currently occupying this target's
    /// scheduling slot. Written only through conditional updates so
    /// concurrent schedulers over the same store cannot both submit.
    #[serde(default)]
    pub outstanding_job_id: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Target {
    /// Create a new Target from registration config, normalizing the URL
    pub fn new(config: TargetConfig) -> Result<Self, TargetError> {
        let url = normalize_url(&config.url)?;
        let now = now_ms();
        Ok(Self {
            url,
            target_type: config.target_type,
            sitemaps: Vec::new(),
            max_requests: config.max_requests,
            max_files: config.max_files,
            download_files: config.download_files,
            file_types: config.file_types,
            ignore_robots_txt: config.ignore_robots_txt,
            crawl_interval_hours: config.crawl_interval_hours,
            last_finished_job_id: None,
            outstanding_job_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a re-registration: configuration fields are overwritten but
    /// `sitemaps`, `last_finished_job_id`, `outstanding_job_id`, and
    /// `created_at` are preserved so an upsert never resets crawl history
    /// or frees an occupied scheduling slot.
    pub fn apply_registration(&mut self, config: TargetConfig) {
        self.target_type = config.target_type;
        self.max_requests = config.max_requests;
        self.max_files = config.max_files;
        self.download_files = config.download_files;
        self.file_types = config.file_types;
        self.ignore_robots_txt = config.ignore_robots_txt;
        self.crawl_interval_hours = config.crawl_interval_hours;
        self.updated_at = now_ms();
    }

    /// Whether this target is ever auto-dispatched
    pub fn is_scheduled(&self) -> bool {
        self.crawl_interval_hours > 0
    }

    /// Record the last finished job reference
    pub fn set_last_finished_job(&mut self, job_id: impl Into<String>) {
        self.last_finished_job_id = Some(job_id.into());
        self.updated_at = now_ms();
    }

    /// Set or clear the scheduling slot
    pub fn set_outstanding_job(&mut self, job_id: Option<String>) {
        self.outstanding_job_id = job_id;
        self.updated_at = now_ms();
    }
}

impl Record for Target {
    fn id(&self) -> &str {
        &self.url
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "targets"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert(
            "target_type".to_string(),
            IndexValue::String(self.target_type.to_string()),
        );
        fields.insert("scheduled".to_string(), IndexValue::Boolean(self.is_scheduled()));
        fields
    }
}
