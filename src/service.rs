//! Shared translation service behind the HTTP API and the chat bot.

use crate::config::Config;
use crate::recognizer::{CancelToken, Recognizer};
use crate::render::GlyphRenderer;
use crate::templates::TemplateLibrary;
use crate::translate::{Language, Translator};
use crate::{Result, XenoglyphError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Reply of every HTTP field while the kill-switch is set.
pub const DISABLED_MESSAGE: &str = "translations currently disabled";

/// Process-wide switch that disables the HTTP translation endpoints.
/// Starts alive.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn revive(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Alien text and its phonetic reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub phonetics: String,
    pub alien: String,
}

#[derive(Debug, Clone)]
pub struct Service {
    recognizer: Recognizer,
    translator: Arc<Translator>,
    renderer: Option<Arc<GlyphRenderer>>,
    kill_switch: KillSwitch,
}

impl Service {
    pub fn new(recognizer: Recognizer, translator: Translator) -> Self {
        Self {
            recognizer,
            translator: Arc::new(translator),
            renderer: None,
            kill_switch: KillSwitch::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: GlyphRenderer) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn with_kill_switch(mut self, kill_switch: KillSwitch) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    /// Loads templates, pronunciation tables and fonts. Missing templates or
    /// fonts degrade the affected operations instead of failing startup.
    pub fn from_config(config: &Config) -> Self {
        let library = match TemplateLibrary::load(&config.templates_dir) {
            Ok(library) => {
                info!(dir = %config.templates_dir.display(), templates = library.len(), "loaded templates");
                library
            }
            Err(e) => {
                warn!(dir = %config.templates_dir.display(), error = %e, "image decoding unavailable");
                TemplateLibrary::default()
            }
        };
        let recognizer = Recognizer::new(library).with_config(config.recognizer.clone());
        let translator = Translator::load(&config.english_ipa, &config.french_ipa);
        let service = Self::new(recognizer, translator);

        match GlyphRenderer::load(&config.font, config.fallback_font.as_deref()) {
            Ok(renderer) => service.with_renderer(renderer),
            Err(e) => {
                warn!(font = %config.font.display(), error = %e, "image encoding unavailable");
                service
            }
        }
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    pub fn recognizer(&self) -> &Recognizer {
        &self.recognizer
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn decode_text(&self, alien: &str) -> Decoded {
        Decoded { phonetics: self.translator.decode(alien), alien: alien.to_string() }
    }

    /// Recognizes the glyphs of an encoded image. CPU-bound.
    pub fn decode_image(&self, image: &[u8], cancel: &CancelToken) -> Result<Decoded> {
        let recognition = self.recognizer.recognize_with(image, cancel)?;
        Ok(self.decode_text(&recognition.symbols))
    }

    pub fn encode_text(&self, text: &str, language: Language) -> String {
        self.translator.encode(text, language)
    }

    /// Encodes `text` and renders the glyphs as PNG.
    pub fn encode_image(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| XenoglyphError::Render("no glyph font loaded".into()))?;
        renderer.render_png(&self.encode_text(text, language))
    }
}
