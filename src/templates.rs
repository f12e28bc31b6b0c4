//! Template library: one reference image per glyph, loaded from a directory
//! where each file's basename is the glyph it depicts.

use crate::binarize::normalize_template_polarity;
use crate::{Result, XenoglyphError};
use image::GrayImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Template {
    pub symbol: String,
    pub image: GrayImage,
}

impl Template {
    pub fn new(symbol: impl Into<String>, image: GrayImage) -> Self {
        Self { symbol: symbol.into(), image }
    }
}

/// Ordered, immutable set of glyph templates.
///
/// Order matters: scale estimation converges over the first templates and
/// reuses the result for the rest, so loading sorts by file name.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: Vec<Template>,
}

impl TemplateLibrary {
    /// Load every `*.png` in `dir`. Unreadable or empty files are skipped.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            warn!(dir = %dir.display(), error = %e, "template directory unavailable");
            XenoglyphError::NoTemplates
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut templates = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(symbol) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let mut image = match image::open(&path) {
                Ok(img) => img.to_luma8(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable template");
                    continue;
                }
            };
            if image.width() == 0 || image.height() == 0 {
                warn!(path = %path.display(), "skipping empty template");
                continue;
            }
            if normalize_template_polarity(&mut image) {
                debug!(%symbol, "inverted template polarity");
            }
            templates.push(Template { symbol, image });
        }

        if templates.is_empty() {
            return Err(XenoglyphError::NoTemplates);
        }
        debug!(count = templates.len(), dir = %dir.display(), "loaded templates");
        Ok(Self { templates })
    }

    /// Build a library from in-memory templates, keeping the given order.
    pub fn from_templates(mut templates: Vec<Template>) -> Self {
        templates.retain(|t| t.image.width() > 0 && t.image.height() > 0);
        for template in &mut templates {
            normalize_template_polarity(&mut template.image);
        }
        Self { templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Template> {
        self.templates.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Template> {
        self.templates.get(index)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.symbol.as_str())
    }
}
