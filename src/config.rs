//! Service and recognizer configuration, loaded from an optional JSON file.

use crate::reconcile::HeightBand;
use crate::{Result, XenoglyphError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

pub const DISCORD_TOKEN_ENV: &str = "XENOGLYPH_DISCORD_TOKEN";
pub const DISCORD_PUBLIC_KEY_ENV: &str = "XENOGLYPH_DISCORD_PUBLIC_KEY";

/// Tuning knobs of the recognizer. Defaults are the values the glyph
/// templates were authored against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// First-pass scale range and step.
    pub scale_min: f64,
    pub scale_max: f64,
    pub scale_step: f64,
    /// Number of coarse-to-fine passes; each narrows to ±step around the
    /// best scale and divides the step by four.
    pub scale_passes: u32,
    /// Lower bound of the refined ranges.
    pub scale_refine_floor: f64,
    /// Scales recorded before convergence is tested.
    pub convergence_min_samples: usize,
    /// Trailing scales averaged by the convergence test.
    pub convergence_window: usize,
    /// Accepted relative deviation of `mean(window) / last` from 1.
    pub convergence_tolerance: f64,
    /// Absolute floor of the match threshold.
    pub base_threshold: f32,
    /// Fraction of a template's best score that peaks must reach.
    pub relative_threshold: f32,
    /// `w / h` within `1 ± square_tolerance` (exclusive) counts as square.
    pub square_tolerance: f64,
    /// Row snapping distance as a fraction of candidate height.
    pub row_tolerance: f64,
    /// Column snapping distance as a fraction of candidate width.
    pub column_tolerance: f64,
    /// Allowed deviation from the average glyph height, as a fraction of
    /// the reference chosen by `height_band`.
    pub height_tolerance: f64,
    pub height_band: HeightBand,
    /// Width ratio below which cell dedup prefers the wider candidate.
    pub size_ratio_gate: f64,
    /// Collect peaks for several templates at once.
    pub parallel: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            scale_min: 0.05,
            scale_max: 10.0,
            scale_step: 0.1,
            scale_passes: 3,
            scale_refine_floor: 0.1,
            convergence_min_samples: 6,
            convergence_window: 3,
            convergence_tolerance: 0.05,
            base_threshold: 0.68,
            relative_threshold: 0.85,
            square_tolerance: 0.15,
            row_tolerance: 0.25,
            column_tolerance: 1.0 / 3.0,
            height_tolerance: 0.25,
            height_band: HeightBand::default(),
            size_ratio_gate: 0.25,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub application_id: Option<String>,
    /// Hex-encoded Ed25519 key used to verify interaction signatures.
    pub public_key: Option<String>,
    pub bot_token: Option<String>,
    /// Guild the commands are registered in; `None` registers them globally.
    pub guild_id: Option<String>,
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            application_id: None,
            public_key: None,
            bot_token: None,
            guild_id: Some("762409528779210823".into()),
            api_base: "https://discord.com/api/v10".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub templates_dir: PathBuf,
    pub english_ipa: PathBuf,
    pub french_ipa: PathBuf,
    /// TrueType font carrying the alien glyphs.
    pub font: PathBuf,
    /// Font used for characters the alien font lacks.
    pub fallback_font: Option<PathBuf>,
    /// Built frontend served on non-API paths, when present.
    pub frontend_dir: Option<PathBuf>,
    pub cors_origin: String,
    /// Largest accepted request body. Decode requests carry whole images.
    pub max_body_bytes: usize,
    pub discord: DiscordConfig,
    pub recognizer: RecognizerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            templates_dir: PathBuf::from("train"),
            english_ipa: PathBuf::from("ipa/en_US.txt"),
            french_ipa: PathBuf::from("ipa/fr_FR.txt"),
            font: PathBuf::from("alien.ttf"),
            fallback_font: None,
            frontend_dir: Some(PathBuf::from("frontend/dist")),
            cors_origin: "https://hvzlien.sylvie.fyi".into(),
            max_body_bytes: 64 * 1024 * 1024,
            discord: DiscordConfig::default(),
            recognizer: RecognizerConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            XenoglyphError::Config(format!("opening config {}: {e}", path.display()))
        })?;
        serde_json::from_reader(file)
            .map_err(|e| XenoglyphError::Config(format!("parsing config {}: {e}", path.display())))
    }

    /// Fill Discord secrets from the environment; environment wins.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(DISCORD_TOKEN_ENV) {
            self.discord.bot_token = Some(token);
        }
        if let Ok(key) = std::env::var(DISCORD_PUBLIC_KEY_ENV) {
            self.discord.public_key = Some(key);
        }
    }
}
