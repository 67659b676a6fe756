use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const ENV_PREFIX: &str = "BEACH_TOUCH_SCROLL_";
const FALLBACK_PX_PER_LINE: f64 = 16.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Keys used to drive the remote multiplexer's copy mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub prefix_key: String,
    pub copy_mode_key: String,
    pub exit_key: String,
    pub cancel_key: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            prefix_key: "C-b".to_string(),
            copy_mode_key: "[".to_string(),
            exit_key: "q".to_string(),
            cancel_key: "q".to_string(),
        }
    }
}

/// Touch scroll configuration. Every field has a default, so partial TOML
/// documents are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub enabled: bool,
    /// Pixels of drag per line. `None` uses the geometry provider's line height.
    pub px_per_line: Option<f64>,
    pub slop_px: f64,
    pub invert_scroll: bool,
    pub enter_delay_ms: u64,
    #[serde(flatten)]
    pub keys: KeyBindings,

    pub coalesce_ms: u64,
    pub min_flush_ms: u64,
    pub max_flush_ms: u64,
    pub max_pages_per_flush: u32,
    pub max_extra_lines: u32,
    pub max_backlog_pages: u32,

    pub velocity_multiplier_enabled: bool,
    /// Pixels per millisecond.
    pub velocity_threshold: f64,
    pub velocity_boost: f64,
    pub velocity_boost_max: f64,
    pub velocity_smoothing: f64,

    pub backlog_multiplier_enabled: bool,
    pub backlog_boost_ref_pages: f64,
    pub backlog_boost_max: f64,

    pub rtt_ewma_alpha: f64,
    pub initial_rtt_ms: f64,
    pub telemetry_interval_ms: u64,
    pub debug: bool,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            px_per_line: None,
            slop_px: 8.0,
            invert_scroll: false,
            enter_delay_ms: 30,
            keys: KeyBindings::default(),
            coalesce_ms: 16,
            min_flush_ms: 24,
            max_flush_ms: 160,
            max_pages_per_flush: 6,
            max_extra_lines: 12,
            max_backlog_pages: 4,
            velocity_multiplier_enabled: true,
            velocity_threshold: 1.2,
            velocity_boost: 0.5,
            velocity_boost_max: 2.0,
            velocity_smoothing: 0.35,
            backlog_multiplier_enabled: true,
            backlog_boost_ref_pages: 2.0,
            backlog_boost_max: 1.0,
            rtt_ewma_alpha: 0.2,
            initial_rtt_ms: 80.0,
            telemetry_interval_ms: 1000,
            debug: false,
        }
    }
}

impl ScrollConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let parsed: ScrollConfig = toml::from_str(contents)?;
        Ok(parsed.sanitized())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Applies `BEACH_TOUCH_SCROLL_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|name| env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ENABLED") {
            self.enabled = parse_bool("ENABLED", &value)?;
        }
        if let Some(value) = lookup("PX_PER_LINE") {
            self.px_per_line = Some(parse_number("PX_PER_LINE", &value)?);
        }
        if let Some(value) = lookup("SLOP_PX") {
            self.slop_px = parse_number("SLOP_PX", &value)?;
        }
        if let Some(value) = lookup("INVERT") {
            self.invert_scroll = parse_bool("INVERT", &value)?;
        }
        if let Some(value) = lookup("PREFIX_KEY") {
            self.keys.prefix_key = value;
        }
        if let Some(value) = lookup("CANCEL_KEY") {
            self.keys.cancel_key = value;
        }
        if let Some(value) = lookup("DEBUG") {
            self.debug = parse_bool("DEBUG", &value)?;
        }
        Ok(self.sanitized())
    }

    /// Clamps values into ranges the controller can work with.
    pub fn sanitized(mut self) -> Self {
        let defaults = ScrollConfig::default();

        self.px_per_line = self.px_per_line.filter(|v| v.is_finite() && *v > 0.0);
        self.slop_px = non_negative(self.slop_px, defaults.slop_px);
        self.min_flush_ms = self.min_flush_ms.max(1);
        self.max_flush_ms = self.max_flush_ms.max(self.min_flush_ms);
        self.max_pages_per_flush = self.max_pages_per_flush.max(1);
        self.max_backlog_pages = self.max_backlog_pages.max(1);
        self.velocity_threshold =
            non_negative(self.velocity_threshold, defaults.velocity_threshold);
        self.velocity_boost = non_negative(self.velocity_boost, defaults.velocity_boost);
        self.velocity_boost_max =
            non_negative(self.velocity_boost_max, defaults.velocity_boost_max);
        self.velocity_smoothing =
            unit_interval(self.velocity_smoothing, defaults.velocity_smoothing);
        self.backlog_boost_ref_pages = if self.backlog_boost_ref_pages.is_finite()
            && self.backlog_boost_ref_pages > 0.0
        {
            self.backlog_boost_ref_pages
        } else {
            defaults.backlog_boost_ref_pages
        };
        self.backlog_boost_max = non_negative(self.backlog_boost_max, defaults.backlog_boost_max);
        self.rtt_ewma_alpha = unit_interval(self.rtt_ewma_alpha, defaults.rtt_ewma_alpha);
        self.initial_rtt_ms = non_negative(self.initial_rtt_ms, defaults.initial_rtt_ms);
        self
    }

    /// Line pitch in pixels, preferring the explicit setting over geometry.
    pub fn effective_px_per_line(&self, geometry_line_height: Option<f64>) -> f64 {
        self.px_per_line
            .or(geometry_line_height.filter(|v| v.is_finite() && *v > 0.0))
            .unwrap_or(FALLBACK_PX_PER_LINE)
    }

    pub fn enter_delay(&self) -> Duration {
        Duration::from_millis(self.enter_delay_ms)
    }

    pub fn coalesce(&self) -> Duration {
        Duration::from_millis(self.coalesce_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }
}

fn non_negative(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

fn unit_interval(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value.min(1.0)
    } else {
        fallback
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: format!("{ENV_PREFIX}{name}"),
            value: value.to_string(),
        }),
    }
}

fn parse_number(name: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidValue {
            name: format!("{ENV_PREFIX}{name}"),
            value: value.to_string(),
        })
}
