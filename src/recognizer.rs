//! Image-to-symbols recognizer driving binarization, scale estimation, peak
//! collection and reconciliation.

use crate::binarize::binarize;
use crate::config::RecognizerConfig;
use crate::correlate::Correlator;
use crate::peaks::collect_peaks;
use crate::reconcile::{reconcile, Candidate, Layout};
use crate::scale::ScaleEstimator;
use crate::templates::{Template, TemplateLibrary};
use crate::{Result, XenoglyphError};
use image::GrayImage;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Cooperative cancellation flag, checked between templates and between
/// scale-search passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(XenoglyphError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Full outcome of one recognition call.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub symbols: String,
    pub layout: Layout,
    /// Scale chosen for each template that fit, in template order.
    pub scales: Vec<f64>,
    /// Scale the record converged to, if it did.
    pub converged_scale: Option<f64>,
}

/// Shareable recognizer. Templates and configuration are immutable; every
/// call owns its working buffers.
#[derive(Debug, Clone)]
pub struct Recognizer {
    library: Arc<TemplateLibrary>,
    config: Arc<RecognizerConfig>,
}

impl Recognizer {
    pub fn new(library: TemplateLibrary) -> Self {
        Self { library: Arc::new(library), config: Arc::new(RecognizerConfig::default()) }
    }

    pub fn with_config(mut self, config: RecognizerConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Glyph symbols found in an encoded image, in reading order.
    pub fn recognize(&self, bytes: &[u8]) -> Result<String> {
        self.recognize_with(bytes, &CancelToken::new()).map(|r| r.symbols)
    }

    pub fn recognize_with(&self, bytes: &[u8], cancel: &CancelToken) -> Result<Recognition> {
        let binary = binarize(bytes)?;
        self.recognize_binary(&binary, cancel)
    }

    #[instrument(level = "debug", skip_all, fields(size = ?binary.dimensions()))]
    pub fn recognize_binary(&self, binary: &GrayImage, cancel: &CancelToken) -> Result<Recognition> {
        if self.library.is_empty() {
            return Err(XenoglyphError::NoTemplates);
        }
        let config = self.config.as_ref();
        let correlator = Correlator::new(binary);

        let mut estimator = ScaleEstimator::new(config);
        let mut plan: Vec<(&Template, f64)> = Vec::with_capacity(self.library.len());
        for template in self.library.iter() {
            cancel.check()?;
            match estimator.next_scale(&correlator, &template.image, cancel)? {
                Some(scale) => plan.push((template, scale)),
                None => debug!(symbol = %template.symbol, "no scale fits, skipping template"),
            }
        }
        let converged_scale = estimator.found();
        let scales = estimator.into_record();

        let collect = |&(template, scale): &(&Template, f64)| -> Result<Vec<Candidate>> {
            cancel.check()?;
            collect_peaks(&correlator, template, scale, config)
        };
        let per_template: Vec<Vec<Candidate>> = if config.parallel {
            plan.par_iter().map(collect).collect::<Result<_>>()?
        } else {
            plan.iter().map(collect).collect::<Result<_>>()?
        };
        let candidates: Vec<Candidate> = per_template.into_iter().flatten().collect();
        let candidate_count = candidates.len();

        let layout = reconcile(candidates, config);
        let symbols = layout.symbols();
        info!(
            templates = plan.len(),
            candidates = candidate_count,
            glyphs = layout.placements.len(),
            ?converged_scale,
            "recognized image"
        );

        Ok(Recognition { symbols, layout, scales, converged_scale })
    }
}
