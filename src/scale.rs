//! Per-template scale search with convergence amortization.
//!
//! Glyphs in one specimen share a rendering size, so the first templates pay
//! for a coarse-to-fine search and, once the chosen scales settle, the rest
//! reuse the settled value.

use crate::config::RecognizerConfig;
use crate::correlate::{max_score, Correlator};
use crate::recognizer::CancelToken;
use crate::Result;
use image::imageops::{resize, FilterType};
use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, instrument, trace};

/// Template resized by `scale` with linear interpolation, or `None` when a
/// side rounds down to zero.
pub fn scale_template(template: &GrayImage, scale: f64) -> Option<GrayImage> {
    let w = (template.width() as f64 * scale) as u32;
    let h = (template.height() as f64 * scale) as u32;
    if w == 0 || h == 0 {
        return None;
    }
    Some(resize(template, w, h, FilterType::Triangle))
}

/// Best correlation of `template` resized by `scale`, `None` when it does
/// not fit.
fn peak_at(correlator: &Correlator, template: &GrayImage, scale: f64) -> Result<Option<(f64, f32)>> {
    let Some(scaled) = scale_template(template, scale) else {
        return Ok(None);
    };
    if !correlator.fits(&scaled) {
        return Ok(None);
    }
    let map = correlator.match_template(&scaled)?;
    Ok(max_score(&map).map(|score| (scale, score)))
}

/// Three-pass coarse-to-fine search for the scale with the highest peak
/// correlation. `None` when no scale of the range fits inside the image.
#[instrument(level = "debug", skip_all, fields(template = ?template.dimensions()))]
pub fn search_scale(
    correlator: &Correlator,
    template: &GrayImage,
    config: &RecognizerConfig,
    cancel: &CancelToken,
) -> Result<Option<f64>> {
    let mut lower = config.scale_min;
    let mut upper = config.scale_max;
    let mut step = config.scale_step;
    let mut best: Option<(f64, f32)> = None;

    for pass in 0..config.scale_passes {
        cancel.check()?;
        let steps = ((upper - lower) / step + 1e-9).floor().max(0.0) as usize;
        let scales: Vec<f64> = (0..=steps).map(|i| lower + i as f64 * step).collect();
        let scored: Vec<Option<(f64, f32)>> = if config.parallel {
            scales.par_iter().map(|&scale| peak_at(correlator, template, scale)).collect::<Result<_>>()?
        } else {
            scales.iter().map(|&scale| peak_at(correlator, template, scale)).collect::<Result<_>>()?
        };
        // Earliest scale wins ties.
        for (scale, score) in scored.into_iter().flatten() {
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((scale, score));
            }
        }

        let Some((best_scale, best_score)) = best else {
            return Ok(None);
        };
        trace!(pass, best_scale, best_score, "scale pass done");
        lower = (best_scale - step).max(config.scale_refine_floor);
        upper = best_scale + step;
        step /= 4.0;
    }

    Ok(best.map(|(scale, _)| scale))
}

/// Tracks the scale record of one recognition call.
#[derive(Debug)]
pub struct ScaleEstimator<'a> {
    config: &'a RecognizerConfig,
    record: Vec<f64>,
    found: Option<f64>,
}

impl<'a> ScaleEstimator<'a> {
    pub fn new(config: &'a RecognizerConfig) -> Self {
        Self { config, record: Vec::new(), found: None }
    }

    /// The converged scale, once the record has settled.
    pub fn found(&self) -> Option<f64> {
        self.found
    }

    pub fn record(&self) -> &[f64] {
        &self.record
    }

    pub fn into_record(self) -> Vec<f64> {
        self.record
    }

    /// Pick the scale for the next template. Searches until the record
    /// converges, then returns the converged scale without searching.
    pub fn next_scale(
        &mut self,
        correlator: &Correlator,
        template: &GrayImage,
        cancel: &CancelToken,
    ) -> Result<Option<f64>> {
        let scale = match self.found {
            Some(scale) => scale,
            None => match search_scale(correlator, template, self.config, cancel)? {
                Some(scale) => scale,
                None => return Ok(None),
            },
        };
        self.commit(scale);
        Ok(Some(scale))
    }

    fn commit(&mut self, scale: f64) {
        self.record.push(scale);
        if self.found.is_none() {
            self.found = self.converged();
            if let Some(found) = self.found {
                debug!(found, samples = self.record.len(), "scale converged");
            }
        }
    }

    // mean(last N) / last within the tolerance band.
    fn converged(&self) -> Option<f64> {
        let window = self.config.convergence_window;
        if window == 0 || self.record.len() < self.config.convergence_min_samples.max(window) {
            return None;
        }
        let tail = &self.record[self.record.len() - window..];
        let mean = tail.iter().sum::<f64>() / window as f64;
        let last = *tail.last()?;
        let ratio = mean / last;
        let tol = self.config.convergence_tolerance;
        (ratio > 1.0 - tol && ratio < 1.0 + tol).then_some(mean)
    }
}
