//! Zero-mean normalized cross-correlation between an image and a template.
//!
//! Scores follow the usual `TM_CCOEFF_NORMED` definition:
//!
//! ```text
//! R(x, y) = Σ T'(i, j) · I'(x + i, y + j) / sqrt(Σ T'² · Σ I'²)
//! ```
//!
//! where `T'` and `I'` are the template and the image window with their means
//! removed. Window sums come from integral images. The numerator is summed
//! directly for small templates and through the image spectrum otherwise;
//! both are kept per [`Correlator`], so one image pays for them once.

use crate::{Result, XenoglyphError};
use image::GrayImage;
use ndarray::Array2;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Direct summation is used while it costs less than this many times the
/// `n log n` of one padded transform.
const FFT_COST_FACTOR: f64 = 8.0;

/// Windows whose pixel variance (times area) is below this are flat.
const FLAT_WINDOW: f64 = 0.25;

/// Correlation map of size `(H - h + 1) × (W - w + 1)`, indexed `[y, x]`.
pub fn match_template(image: &GrayImage, template: &GrayImage) -> Result<Array2<f32>> {
    Correlator::new(image).match_template(template)
}

/// Largest value of a correlation map, `None` when the map is empty.
pub fn max_score(map: &Array2<f32>) -> Option<f32> {
    map.iter().copied().reduce(f32::max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Direct,
    Fourier,
}

/// One input image prepared for matching many templates.
pub struct Correlator<'a> {
    image: &'a GrayImage,
    integral: Integral,
    padded: (usize, usize),
    spectrum: OnceCell<Spectrum>,
}

impl std::fmt::Debug for Correlator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("size", &self.image.dimensions())
            .field("padded", &self.padded)
            .field("spectrum", &self.spectrum.get().is_some())
            .finish()
    }
}

impl<'a> Correlator<'a> {
    pub fn new(image: &'a GrayImage) -> Self {
        let padded = (fft_len(image.width() as usize), fft_len(image.height() as usize));
        Self { image, integral: Integral::new(image), padded, spectrum: OnceCell::new() }
    }

    /// Whether a template of this size fits inside the image.
    pub fn fits(&self, template: &GrayImage) -> bool {
        template.width() <= self.image.width() && template.height() <= self.image.height()
    }

    /// Cheaper numerator strategy for a `tw × th` template.
    pub fn method_for(&self, tw: usize, th: usize) -> Method {
        let (iw, ih) = (self.image.width() as usize, self.image.height() as usize);
        let outputs = (iw.saturating_sub(tw) + 1) * (ih.saturating_sub(th) + 1);
        let direct = outputs as f64 * (tw * th) as f64;
        let n = (self.padded.0 * self.padded.1) as f64;
        if direct <= FFT_COST_FACTOR * n * n.log2().max(1.0) {
            Method::Direct
        } else {
            Method::Fourier
        }
    }

    pub fn match_template(&self, template: &GrayImage) -> Result<Array2<f32>> {
        let (tw, th) = (template.width() as usize, template.height() as usize);
        self.match_template_with(template, self.method_for(tw, th))
    }

    pub fn match_template_with(&self, template: &GrayImage, method: Method) -> Result<Array2<f32>> {
        let (iw, ih) = (self.image.width() as usize, self.image.height() as usize);
        let (tw, th) = (template.width() as usize, template.height() as usize);
        if tw == 0 || th == 0 || tw > iw || th > ih {
            return Err(XenoglyphError::OcrInternal(format!(
                "template {tw}x{th} does not fit image {iw}x{ih}"
            )));
        }

        let out_w = iw - tw + 1;
        let out_h = ih - th + 1;
        let n = (tw * th) as f64;

        let t_mean = template.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
        let centered: Vec<f64> = template.pixels().map(|p| p.0[0] as f64 - t_mean).collect();
        let t_norm2: f64 = centered.iter().map(|v| v * v).sum();

        if t_norm2 <= f64::EPSILON {
            // A flat template carries no shape; it never matches.
            return shaped(out_h, out_w, vec![0f32; out_w * out_h]);
        }

        let numerators = match method {
            Method::Direct => self.direct_numerators(&centered, tw, th, out_w, out_h),
            Method::Fourier => self.fourier_numerators(&centered, tw, th, out_w, out_h),
        };

        let mut scores = vec![0f32; out_w * out_h];
        scores
            .par_chunks_mut(out_w)
            .zip(numerators.par_chunks(out_w))
            .enumerate()
            .for_each(|(y, (row, nums))| {
                for (x, (out, &num)) in row.iter_mut().zip(nums).enumerate() {
                    let (sum, sum_sq) = self.integral.window(x, y, tw, th);
                    let window_var = sum_sq - sum * sum / n;
                    if window_var >= FLAT_WINDOW {
                        *out = normalize(num, (window_var * t_norm2).sqrt());
                    }
                }
            });
        shaped(out_h, out_w, scores)
    }

    fn direct_numerators(&self, centered: &[f64], tw: usize, th: usize, out_w: usize, out_h: usize) -> Vec<f64> {
        let iw = self.image.width() as usize;
        let pixels = self.image.as_raw();
        let mut data = vec![0f64; out_w * out_h];
        data.par_chunks_mut(out_w).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut num = 0f64;
                for j in 0..th {
                    let img_row = &pixels[(y + j) * iw + x..(y + j) * iw + x + tw];
                    let tpl_row = &centered[j * tw..(j + 1) * tw];
                    num += img_row.iter().zip(tpl_row).map(|(&p, &t)| p as f64 * t).sum::<f64>();
                }
                *out = num;
            }
        });
        data
    }

    // Circular cross-correlation through the spectrum. The padded size is at
    // least the image size, so valid placements never wrap.
    fn fourier_numerators(&self, centered: &[f64], tw: usize, th: usize, out_w: usize, out_h: usize) -> Vec<f64> {
        let spectrum = self.spectrum.get_or_init(|| Spectrum::new(self.image, self.padded));
        let (pw, ph) = self.padded;

        let mut buf = vec![Complex::new(0.0, 0.0); pw * ph];
        for j in 0..th {
            for i in 0..tw {
                buf[j * pw + i] = Complex::new(centered[j * tw + i], 0.0);
            }
        }
        fft2(&mut buf, pw, ph, &spectrum.forward);
        buf.par_iter_mut()
            .zip(spectrum.image.par_iter())
            .for_each(|(t, &i)| *t = i * t.conj());
        fft2(&mut buf, pw, ph, &spectrum.inverse);

        let norm = 1.0 / (pw * ph) as f64;
        let mut data = Vec::with_capacity(out_w * out_h);
        for y in 0..out_h {
            data.extend(buf[y * pw..y * pw + out_w].iter().map(|c| c.re * norm));
        }
        data
    }
}

fn shaped(out_h: usize, out_w: usize, data: Vec<f32>) -> Result<Array2<f32>> {
    Array2::from_shape_vec((out_h, out_w), data).map_err(|e| XenoglyphError::OcrInternal(e.to_string()))
}

// Flat windows (denominator ~ 0) score 0; slight overshoot from rounding is
// clamped to ±1.
fn normalize(num: f64, denom: f64) -> f32 {
    if num.abs() < denom {
        (num / denom) as f32
    } else if num.abs() < denom * 1.125 {
        num.signum() as f32
    } else {
        0.0
    }
}

/// Smallest `n' >= n` whose only prime factors are 2, 3 and 5.
fn fft_len(n: usize) -> usize {
    (n.max(1)..)
        .find(|&m| {
            let mut m = m;
            for p in [2, 3, 5] {
                while m % p == 0 {
                    m /= p;
                }
            }
            m == 1
        })
        .unwrap_or(n)
}

/// Row and column plans, `[rows, columns]`.
type Plans = [Arc<dyn Fft<f64>>; 2];

struct Spectrum {
    forward: Plans,
    inverse: Plans,
    image: Vec<Complex<f64>>,
}

impl Spectrum {
    fn new(image: &GrayImage, (pw, ph): (usize, usize)) -> Self {
        let mut planner = FftPlanner::new();
        let forward = [planner.plan_fft_forward(pw), planner.plan_fft_forward(ph)];
        let inverse = [planner.plan_fft_inverse(pw), planner.plan_fft_inverse(ph)];

        let w = image.width() as usize;
        let mut data = vec![Complex::new(0.0, 0.0); pw * ph];
        for (y, row) in image.as_raw().chunks_exact(w.max(1)).enumerate() {
            for (x, &p) in row.iter().enumerate() {
                data[y * pw + x] = Complex::new(p as f64, 0.0);
            }
        }
        fft2_serial(&mut data, pw, ph, &forward);
        Self { forward, inverse, image: data }
    }
}

/// In-place 2-D transform of a row-major `width × height` buffer.
fn fft2(data: &mut [Complex<f64>], width: usize, height: usize, plans: &Plans) {
    data.par_chunks_mut(width).for_each(|row| plans[0].process(row));
    let mut columns = transpose(data, width, height);
    columns.par_chunks_mut(height).for_each(|column| plans[1].process(column));
    let rows = transpose(&columns, height, width);
    data.copy_from_slice(&rows);
}

// Single-threaded variant for use inside `OnceCell::get_or_init`: a rayon
// worker waiting on its own jobs may steal a task that re-enters the cell.
fn fft2_serial(data: &mut [Complex<f64>], width: usize, height: usize, plans: &Plans) {
    data.chunks_mut(width).for_each(|row| plans[0].process(row));
    let mut columns = transpose(data, width, height);
    columns.chunks_mut(height).for_each(|column| plans[1].process(column));
    let rows = transpose(&columns, height, width);
    data.copy_from_slice(&rows);
}

fn transpose(data: &[Complex<f64>], width: usize, height: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for (y, row) in data.chunks_exact(width).enumerate() {
        for (x, &v) in row.iter().enumerate() {
            out[x * height + y] = v;
        }
    }
    out
}

struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0f64; stride * (h + 1)];
        let mut sum_sq = vec![0f64; stride * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row_sum = 0f64;
            let mut row_sq = 0f64;
            for x in 0..w {
                let v = raw[y * w + x] as f64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { stride, sum, sum_sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let (x1, y1) = (x + w, y + h);
        let rect = |t: &[f64]| t[y1 * s + x1] - t[y * s + x1] - t[y1 * s + x] + t[y * s + x];
        (rect(&self.sum[..]), rect(&self.sum_sq[..]))
    }
}
