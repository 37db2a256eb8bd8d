use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub registrants_url: Option<String>,
    #[serde(default)]
    pub leaderboard_url: Option<String>,
    #[serde(default)]
    pub winners_url: Option<String>,
    #[serde(default)]
    pub comments_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_key")]
    pub key: String,
    #[serde(default = "default_cache_max_age_seconds")]
    pub max_age_seconds: u64,
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key: default_cache_key(),
            max_age_seconds: default_cache_max_age_seconds(),
            directory: None,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    pub fn resolved_directory(&self) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("brewoff")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresentationConfig {
    #[serde(default = "default_max_bubbles")]
    pub max_bubbles: usize,
    #[serde(default = "default_bubble_display_ms")]
    pub bubble_display_ms: u64,
    #[serde(default = "default_bubble_spacer_ms")]
    pub bubble_spacer_ms: u64,
    #[serde(default = "default_bubble_initial_delay_ms")]
    pub bubble_initial_delay_ms: u64,
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
    #[serde(default = "default_reveal_seen_days")]
    pub reveal_seen_days: i64,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            max_bubbles: default_max_bubbles(),
            bubble_display_ms: default_bubble_display_ms(),
            bubble_spacer_ms: default_bubble_spacer_ms(),
            bubble_initial_delay_ms: default_bubble_initial_delay_ms(),
            max_image_dimension: default_max_image_dimension(),
            reveal_seen_days: default_reveal_seen_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrewOffConfig {
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Converts the judges' raw rating scale to the display scale.
    /// Applied to the five averages and the total, never to votes.
    #[serde(default = "default_score_scale")]
    pub score_scale: f64,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
}

impl Default for BrewOffConfig {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            score_scale: default_score_scale(),
            cache: CacheConfig::default(),
            refresh: RefreshConfig::default(),
            presentation: PresentationConfig::default(),
        }
    }
}

fn default_cache_key() -> String {
    "brew-off:data:v1".to_string()
}

fn default_cache_max_age_seconds() -> u64 {
    5 * 60
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_score_scale() -> f64 {
    1.0
}

fn default_max_bubbles() -> usize {
    3
}

fn default_bubble_display_ms() -> u64 {
    12_000
}

fn default_bubble_spacer_ms() -> u64 {
    1_000
}

fn default_bubble_initial_delay_ms() -> u64 {
    500
}

fn default_max_image_dimension() -> u32 {
    1200
}

fn default_reveal_seen_days() -> i64 {
    365
}

pub fn parse_config(raw: &str) -> Result<BrewOffConfig, String> {
    let config = toml::from_str::<BrewOffConfig>(raw).map_err(|err| err.to_string())?;
    if !config.score_scale.is_finite() || config.score_scale <= 0.0 {
        return Err(format!(
            "score_scale must be a positive number, got {}",
            config.score_scale
        ));
    }
    Ok(config)
}

pub fn load_brewoff_config(config_path: &Path) -> Result<BrewOffConfig, String> {
    if !config_path.exists() {
        info!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        return Ok(BrewOffConfig::default());
    }

    let raw = fs::read_to_string(config_path).map_err(|err| {
        format!(
            "Failed to read config at {}: {}",
            config_path.display(),
            err
        )
    })?;

    parse_config(&raw).map_err(|err| {
        format!(
            "Failed to parse config at {}: {}",
            config_path.display(),
            err
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.score_scale, 1.0);
        assert_eq!(config.cache.key, "brew-off:data:v1");
        assert_eq!(config.cache.max_age(), Duration::from_secs(300));
        assert_eq!(config.refresh.poll_interval_seconds, 60);
        assert_eq!(config.presentation.max_bubbles, 3);
        assert!(config.sources.comments_url.is_none());
    }

    #[test]
    fn sources_and_scale_are_read() {
        let config = parse_config(
            r#"
score_scale = 2.0

[sources]
registrants_url = "http://example.test/reg.tsv"
leaderboard_url = "http://example.test/lb.tsv"
winners_url = "http://example.test/win.tsv"

[presentation]
max_bubbles = 1
"#,
        )
        .unwrap();
        assert_eq!(config.score_scale, 2.0);
        assert_eq!(
            config.sources.leaderboard_url.as_deref(),
            Some("http://example.test/lb.tsv")
        );
        assert_eq!(config.presentation.max_bubbles, 1);
        assert_eq!(config.presentation.bubble_display_ms, 12_000);
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert!(parse_config("score_scale = 0.0").is_err());
        assert!(parse_config("score_scale = -1.5").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_brewoff_config(&dir.path().join("brewoff.toml")).unwrap();
        assert_eq!(config.cache.max_age_seconds, 300);
    }
}
