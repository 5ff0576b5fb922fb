//! Stretch engine configuration
//!
//! Construction-time settings with validation, plus a plain `key=value` text
//! form so presets can live in files.

use crate::error::{Result, StretchError};
use crate::placement::PlacementMode;
use crate::rate::validate_rate;
use crate::window::WindowFunction;
use flex_analysis::BiasTaper;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StretchConfig {
    /// Number of interleaved audio channels (≥ 1)
    pub channels: usize,
    /// Analysis block length in samples (even, ≥ 2)
    pub block_size: usize,
    /// Expected chunk length per call; sizes the sample history
    pub chunk_size: usize,
    /// Phase alignment search radius in samples (≤ block_size / 2)
    pub search_window: usize,
    /// Analysis window
    pub window: WindowFunction,
    /// Block placement strategy
    pub placement: PlacementMode,
    /// Bias applied during the phase alignment search
    pub bias: BiasTaper,
    /// Initial rate, input samples per output sample
    pub rate: f32,
}

impl Default for StretchConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            block_size: 1024,
            chunk_size: 1024,
            search_window: 128,
            window: WindowFunction::Hann,
            placement: PlacementMode::PhaseAligned,
            bias: BiasTaper::Gaussian { factor: 0.02 },
            rate: 1.0,
        }
    }
}

impl StretchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_search_window(mut self, search_window: usize) -> Self {
        self.search_window = search_window;
        self
    }

    pub fn with_window(mut self, window: WindowFunction) -> Self {
        self.window = window;
        self
    }

    pub fn with_placement(mut self, placement: PlacementMode) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_bias(mut self, bias: BiasTaper) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    /// Check every field; invalid values are rejected, never clamped
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(invalid("channels", "must be at least 1"));
        }
        if self.block_size < 2 || self.block_size % 2 != 0 {
            return Err(invalid("block_size", "must be even and at least 2"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be at least 1"));
        }
        if self.search_window > self.block_size / 2 {
            return Err(invalid(
                "search_window",
                format!("must not exceed half the block size ({})", self.block_size / 2),
            ));
        }
        if let WindowFunction::Kaiser { beta } = self.window {
            if !beta.is_finite() || beta < 0.0 {
                return Err(invalid("kaiser_beta", "must be a finite value ≥ 0"));
            }
        }
        match self.bias {
            BiasTaper::Gaussian { factor } if !factor.is_finite() || factor < 0.0 => {
                return Err(invalid("bias_factor", "must be a finite value ≥ 0"));
            }
            BiasTaper::Bartlett { affinity } if !(0.0..=1.0).contains(&affinity) => {
                return Err(invalid("bias_affinity", "must be within [0, 1]"));
            }
            _ => {}
        }
        validate_rate(self.rate)?;
        Ok(())
    }

    /// Half a block: the overlap and output granularity
    #[inline]
    pub fn semi_block(&self) -> usize {
        self.block_size / 2
    }

    /// Input the engine reads ahead of its nominal position
    #[inline]
    pub fn lookahead(&self) -> usize {
        self.block_size + self.search_window
    }

    /// Ring buffer capacity: a chunk in flight, the cold-start latency and
    /// one block plus search margin on either side
    #[inline]
    pub fn history_capacity(&self) -> usize {
        2 * (self.chunk_size + self.block_size + self.search_window) + self.block_size
    }

    /// Load config from a file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Parse `key = value` lines; `#` starts a comment, unknown keys are ignored.
    /// Missing keys keep their defaults. The result is validated.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut window = (0, config.window.name().to_string());
        let mut kaiser_beta = 6.0f32;
        let mut bias = (0, "gaussian".to_string());
        let mut bias_factor = 0.02f32;
        let mut bias_affinity = 0.5f32;

        for (index, line) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(StretchError::Parse {
                    line: line_no,
                    message: format!("expected key=value, got `{}`", line),
                });
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "channels" => config.channels = parse_value(line_no, key, value)?,
                "block_size" => config.block_size = parse_value(line_no, key, value)?,
                "chunk_size" => config.chunk_size = parse_value(line_no, key, value)?,
                "search_window" => config.search_window = parse_value(line_no, key, value)?,
                "rate" => config.rate = parse_value(line_no, key, value)?,
                "window" => window = (line_no, value.to_ascii_lowercase()),
                "kaiser_beta" => kaiser_beta = parse_value(line_no, key, value)?,
                "bias" => bias = (line_no, value.to_ascii_lowercase()),
                "bias_factor" => bias_factor = parse_value(line_no, key, value)?,
                "bias_affinity" => bias_affinity = parse_value(line_no, key, value)?,
                "placement" => {
                    config.placement = match value.to_ascii_lowercase().as_str() {
                        "fixed" => PlacementMode::FixedHop,
                        "rate" => PlacementMode::RateAdjusted,
                        "wsola" => PlacementMode::PhaseAligned,
                        other => return Err(unknown_choice(line_no, key, other)),
                    }
                }
                _ => {} // Ignore unknown keys
            }
        }

        let (window_line, window) = window;
        config.window = match window.as_str() {
            "hann" => WindowFunction::Hann,
            "bartlett" => WindowFunction::Bartlett,
            "kaiser" => WindowFunction::Kaiser { beta: kaiser_beta },
            other => return Err(unknown_choice(window_line, "window", other)),
        };
        let (bias_line, bias) = bias;
        config.bias = match bias.as_str() {
            "none" => BiasTaper::None,
            "gaussian" => BiasTaper::Gaussian { factor: bias_factor },
            "bartlett" => BiasTaper::Bartlett {
                affinity: bias_affinity,
            },
            other => return Err(unknown_choice(bias_line, "bias", other)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize to the `key = value` form read by [`StretchConfig::parse`]
    pub fn to_config_string(&self) -> String {
        let mut lines = vec![
            "# flex stretch configuration".to_string(),
            format!("channels={}", self.channels),
            format!("block_size={}", self.block_size),
            format!("chunk_size={}", self.chunk_size),
            format!("search_window={}", self.search_window),
            format!("rate={}", self.rate),
            format!("placement={}", self.placement.name()),
            format!("window={}", self.window.name()),
        ];

        if let WindowFunction::Kaiser { beta } = self.window {
            lines.push(format!("kaiser_beta={}", beta));
        }

        match self.bias {
            BiasTaper::None => lines.push("bias=none".to_string()),
            BiasTaper::Gaussian { factor } => {
                lines.push("bias=gaussian".to_string());
                lines.push(format!("bias_factor={}", factor));
            }
            BiasTaper::Bartlett { affinity } => {
                lines.push("bias=bartlett".to_string());
                lines.push(format!("bias_affinity={}", affinity));
            }
        }

        lines.join("\n")
    }
}

impl FromStr for StretchConfig {
    type Err = StretchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> StretchError {
    StretchError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}

fn unknown_choice(line: usize, key: &str, value: &str) -> StretchError {
    StretchError::Parse {
        line,
        message: format!("unknown {} `{}`", key, value),
    }
}

fn parse_value<T: FromStr>(line: usize, key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| StretchError::Parse {
        line,
        message: format!("invalid value `{}` for {}", value, key),
    })
}
