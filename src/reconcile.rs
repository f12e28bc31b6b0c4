//! Geometric reconciliation: turns the pooled peaks of every template into
//! one glyph per text cell, ordered top-to-bottom and left-to-right.
//!
//! Stages, each consuming the survivors of the previous one:
//!
//! 1. candidates are ordered by descending confidence, so the strongest
//!    match near a y-coordinate defines that row;
//! 2. square-like candidates register row anchors and contribute to the
//!    average glyph height;
//! 3. every candidate snaps to a row or is dropped, and candidates of the
//!    wrong height are dropped;
//! 4. per row, centers snap to column anchors;
//! 5. each `(row, column)` cell keeps a single winner.

use crate::config::RecognizerConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// Reference height of the height filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeightBand {
    /// Drop when `|avg - h| > tol · h`. A tall spurious match is judged
    /// against its own height.
    #[default]
    Candidate,
    /// Drop when `|avg - h| > tol · avg`.
    Average,
}

/// One raw template match.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub symbol: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl Candidate {
    pub fn center_x(&self) -> i64 {
        self.x as i64 + self.width as i64 / 2
    }

    pub fn center_y(&self) -> i64 {
        self.y as i64 + self.height as i64 / 2
    }

    pub fn is_square(&self, tolerance: f64) -> bool {
        let ratio = self.width as f64 / self.height.max(1) as f64;
        ratio > 1.0 - tolerance && ratio < 1.0 + tolerance
    }
}

/// A candidate with its snapped center.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub candidate: Candidate,
    pub center_x: i64,
    pub center_y: i64,
}

impl Placement {
    fn new(candidate: Candidate) -> Self {
        let (center_x, center_y) = (candidate.center_x(), candidate.center_y());
        Self { candidate, center_x, center_y }
    }

    fn cell(&self) -> (i64, i64) {
        (self.center_y, self.center_x)
    }
}

/// Result of reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    /// Winners in `(center_y, center_x)` order.
    pub placements: Vec<Placement>,
    /// Row anchors in registration order.
    pub rows: Vec<i64>,
    /// Integer mean height of square-like candidates, `0` if there were none.
    pub average_height: i64,
}

impl Layout {
    pub fn symbols(&self) -> String {
        self.placements.iter().map(|p| p.candidate.symbol.as_str()).collect()
    }
}

#[instrument(level = "debug", skip_all, fields(candidates = candidates.len()))]
pub fn reconcile(mut candidates: Vec<Candidate>, config: &RecognizerConfig) -> Layout {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let (placements, rows, average_height) = anchor_rows(candidates, config);
    let survivors = filter_rows(placements, &rows, average_height, config);
    debug!(rows = rows.len(), average_height, survivors = survivors.len(), "rows anchored");

    let survivors = anchor_columns(survivors, config);
    let placements = dedup_cells(survivors, config.size_ratio_gate);
    debug!(glyphs = placements.len(), "cells resolved");

    Layout { placements, rows, average_height }
}

fn within(value: i64, anchor: i64, tolerance: f64) -> bool {
    ((value - anchor).abs() as f64) < tolerance
}

fn find_anchor(anchors: &[i64], value: i64, tolerance: f64) -> Option<i64> {
    anchors.iter().copied().find(|&a| within(value, a, tolerance))
}

fn anchor_rows(
    candidates: Vec<Candidate>,
    config: &RecognizerConfig,
) -> (Vec<Placement>, Vec<i64>, i64) {
    let mut rows: Vec<i64> = Vec::new();
    let mut heights: Vec<i64> = Vec::new();
    let mut placements = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let mut placement = Placement::new(candidate);
        let c = &placement.candidate;
        if c.is_square(config.square_tolerance) {
            heights.push(c.height as i64);
            let tolerance = c.height as f64 * config.row_tolerance;
            match find_anchor(&rows, placement.center_y, tolerance) {
                Some(row) => placement.center_y = row,
                None => rows.push(placement.center_y),
            }
        }
        placements.push(placement);
    }

    let average_height = if heights.is_empty() {
        0
    } else {
        heights.iter().sum::<i64>() / heights.len() as i64
    };
    (placements, rows, average_height)
}

fn height_ok(height: i64, average: i64, config: &RecognizerConfig) -> bool {
    let reference = match config.height_band {
        HeightBand::Candidate => height,
        HeightBand::Average => average,
    };
    ((average - height).abs() as f64) <= reference as f64 * config.height_tolerance
}

fn filter_rows(
    placements: Vec<Placement>,
    rows: &[i64],
    average_height: i64,
    config: &RecognizerConfig,
) -> Vec<Placement> {
    placements
        .into_iter()
        .filter_map(|mut p| {
            let height = p.candidate.height as i64;
            let row = find_anchor(rows, p.center_y, height as f64 * config.row_tolerance)?;
            if !height_ok(height, average_height, config) {
                return None;
            }
            p.center_y = row;
            Some(p)
        })
        .collect()
}

fn anchor_columns(mut survivors: Vec<Placement>, config: &RecognizerConfig) -> Vec<Placement> {
    let mut columns: HashMap<i64, Vec<i64>> = HashMap::new();
    for p in &mut survivors {
        let anchors = columns.entry(p.center_y).or_default();
        let tolerance = p.candidate.width as f64 * config.column_tolerance;
        match find_anchor(anchors, p.center_x, tolerance) {
            Some(col) => p.center_x = col,
            None => anchors.push(p.center_x),
        }
    }
    survivors
}

/// Whether `a` beats `b` for a cell: widths more than `1 / gate` apart favor
/// the wider match, otherwise the more confident one wins.
pub fn prefers(a: &Candidate, b: &Candidate, gate: f64) -> bool {
    let (small, large) = (a.width.min(b.width), a.width.max(b.width));
    if large > 0 && (small as f64 / large as f64) < gate {
        a.width > b.width
    } else {
        a.confidence > b.confidence
    }
}

// Ties keep the earlier candidate.
fn dedup_cells(survivors: Vec<Placement>, gate: f64) -> Vec<Placement> {
    let mut cells: BTreeMap<(i64, i64), Placement> = BTreeMap::new();
    for p in survivors {
        match cells.get_mut(&p.cell()) {
            Some(winner) => {
                if prefers(&p.candidate, &winner.candidate, gate) {
                    *winner = p;
                }
            }
            None => {
                cells.insert(p.cell(), p);
            }
        }
    }
    // BTreeMap iteration is already (center_y, center_x) ascending.
    cells.into_values().collect()
}
