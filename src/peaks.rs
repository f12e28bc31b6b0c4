//! Peak collection: every location whose correlation reaches a
//! template-relative threshold becomes a match candidate.

use crate::config::RecognizerConfig;
use crate::correlate::{max_score, Correlator};
use crate::reconcile::Candidate;
use crate::scale::scale_template;
use crate::templates::Template;
use crate::Result;
use tracing::trace;

/// `max(base, relative · best)`: weak templates cannot flood the result,
/// while near-peak duplicates survive for the reconciler to resolve.
pub fn match_threshold(best: f32, config: &RecognizerConfig) -> f32 {
    config.base_threshold.max(best * config.relative_threshold)
}

/// Candidates of one template at `scale`, in row-major order. No
/// suppression happens here.
pub fn collect_peaks(
    correlator: &Correlator,
    template: &Template,
    scale: f64,
    config: &RecognizerConfig,
) -> Result<Vec<Candidate>> {
    let Some(scaled) = scale_template(&template.image, scale) else {
        return Ok(Vec::new());
    };
    if !correlator.fits(&scaled) {
        return Ok(Vec::new());
    }
    let (w, h) = scaled.dimensions();

    let map = correlator.match_template(&scaled)?;
    let Some(best) = max_score(&map) else {
        return Ok(Vec::new());
    };
    let threshold = match_threshold(best, config);

    let candidates: Vec<Candidate> = map
        .indexed_iter()
        .filter(|(_, &score)| score >= threshold)
        .map(|((y, x), &score)| Candidate {
            symbol: template.symbol.clone(),
            x: x as u32,
            y: y as u32,
            width: w,
            height: h,
            confidence: score,
        })
        .collect();

    trace!(symbol = %template.symbol, best, threshold, count = candidates.len(), "peaks");
    Ok(candidates)
}
