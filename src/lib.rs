//! Alien glyph translator: recognizes template glyphs in raster images and
//! translates between the glyph script and English/French phonetics.

pub mod binarize;
pub mod bot;
pub mod config;
pub mod correlate;
pub mod discord;
pub mod emoji;
pub mod http;
pub mod peaks;
pub mod recognizer;
pub mod reconcile;
pub mod render;
pub mod scale;
pub mod service;
pub mod templates;
pub mod translate;

pub use config::{Config, RecognizerConfig};
pub use recognizer::{CancelToken, Recognition, Recognizer};
pub use reconcile::{Candidate, HeightBand, Placement};
pub use render::GlyphRenderer;
pub use service::{Decoded, KillSwitch, Service};
pub use templates::{Template, TemplateLibrary};
pub use translate::{Language, Translator};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum XenoglyphError {
    #[error("error decoding image: {0}")]
    Decode(String),
    #[error("no template files found")]
    NoTemplates,
    #[error("OCR internal error: {0}")]
    OcrInternal(String),
    #[error("recognition cancelled")]
    Cancelled,
    #[error("render error: {0}")]
    Render(String),
    #[error("discord error: {0}")]
    Discord(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, XenoglyphError>;
