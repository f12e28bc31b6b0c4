//! End-to-end recognition on synthetic glyph pages.

use image::{GrayImage, ImageFormat, Luma};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, Instant};
use xenoglyph::{
    CancelToken, HeightBand, Recognizer, RecognizerConfig, Template, TemplateLibrary,
    XenoglyphError,
};

const SYMBOLS: [&str; 7] = ["☂", "☔", "☀", "☁", "☑", "☒", "☌"];

const GLYPHS: [[&str; 12]; 7] = [
    [
        "............",
        "............",
        "............",
        "............",
        "............",
        "............",
        ".........#..",
        ".........##.",
        ".......####.",
        "...##.##..#.",
        "...###.#..#.",
        "............",
    ],
    [
        "............",
        "..........#.",
        ".##.......#.",
        "..##.....##.",
        "..###....##.",
        "...##..####.",
        "........##..",
        "........##..",
        "............",
        "............",
        "............",
        "............",
    ],
    [
        "............",
        "..####......",
        ".##.###.....",
        "...##.......",
        "...#........",
        "............",
        "............",
        "............",
        "............",
        "......#.#...",
        ".....###.##.",
        "............",
    ],
    [
        "............",
        "............",
        "...##.#...#.",
        "...#####..#.",
        "......#####.",
        ".......#....",
        "............",
        "............",
        "............",
        "............",
        "............",
        "............",
    ],
    [
        "............",
        "............",
        "............",
        "............",
        "............",
        "............",
        ".....##.....",
        ".....####.#.",
        "......##.##.",
        ".....##.##..",
        "....##..#...",
        "............",
    ],
    [
        "............",
        ".##.........",
        ".###........",
        "..##........",
        "........#.#.",
        ".........##.",
        ".........##.",
        ".........##.",
        ".........#..",
        "........###.",
        ".........##.",
        "............",
    ],
    [
        "............",
        "............",
        ".....#...#..",
        "....####.##.",
        "...##...##..",
        "...#...#.#..",
        "..#...#.....",
        "......##....",
        "........###.",
        "..........#.",
        "............",
        "............",
    ],
];

/// Glyph `index` drawn dark on white, each art cell `cell` pixels wide.
fn glyph(index: usize, cell: u32) -> GrayImage {
    let art = &GLYPHS[index];
    GrayImage::from_fn(12 * cell, 12 * cell, |x, y| {
        if art[(y / cell) as usize].as_bytes()[(x / cell) as usize] == b'#' {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// Natural-size glyphs laid out on a 16 px column pitch and a 20 px row
/// pitch with a 4 px margin.
fn page(indices: &[usize], rows: usize) -> GrayImage {
    page_at(indices, rows, 1)
}

/// `page` with every length multiplied by `cell`.
fn page_at(indices: &[usize], rows: usize, cell: u32) -> GrayImage {
    let per_row = indices.len().div_ceil(rows);
    let (margin, pitch_x, pitch_y) = (4 * cell, 16 * cell, 20 * cell);
    let mut page = GrayImage::from_pixel(
        margin + pitch_x * per_row as u32,
        margin + pitch_y * rows as u32,
        Luma([255]),
    );
    for (i, &index) in indices.iter().enumerate() {
        let (row, col) = ((i / per_row) as u32, (i % per_row) as u32);
        let (x, y) = (margin + pitch_x * col, margin + pitch_y * row);
        image::imageops::overlay(&mut page, &glyph(index, cell), x as i64, y as i64);
    }
    page
}

fn png(image: &GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

fn write_templates(dir: &Path, indices: &[usize], cell: u32) {
    for &index in indices {
        glyph(index, cell)
            .save(dir.join(format!("{}.png", SYMBOLS[index])))
            .unwrap();
    }
}

fn recognizer(indices: &[usize], cell: u32) -> Recognizer {
    let dir = tempfile::tempdir().unwrap();
    write_templates(dir.path(), indices, cell);
    Recognizer::new(TemplateLibrary::load(dir.path()).unwrap())
}

fn expected(indices: &[usize]) -> String {
    indices.iter().map(|&i| SYMBOLS[i]).collect()
}

#[test]
fn repeated_glyph_reads_as_repeated_symbol() {
    let recognizer = recognizer(&[0], 1);
    let symbols = recognizer.recognize(&png(&page(&[0, 0, 0], 1))).unwrap();
    assert_eq!(symbols, "☂☂☂");
}

#[test]
fn line_of_distinct_glyphs_reads_left_to_right() {
    let recognizer = recognizer(&[0, 1, 2], 1);
    let symbols = recognizer.recognize(&png(&page(&[0, 1, 2], 1))).unwrap();
    assert_eq!(symbols, "☂☔☀");
}

#[test]
fn rows_read_top_to_bottom_with_one_glyph_per_cell() {
    let order = [0, 1, 2, 2, 0, 1];
    let recognizer = recognizer(&[0, 1, 2], 1);
    let recognition = recognizer
        .recognize_with(&png(&page(&order, 2)), &CancelToken::new())
        .unwrap();
    assert_eq!(recognition.symbols, expected(&order));

    let placements = &recognition.layout.placements;
    assert_eq!(recognition.layout.rows.len(), 2);
    for pair in placements.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.center_y <= b.center_y);
        if a.center_y == b.center_y {
            assert!(a.center_x < b.center_x);
        }
    }
    let cells: HashSet<(i64, i64)> = placements.iter().map(|p| (p.center_y, p.center_x)).collect();
    assert_eq!(cells.len(), placements.len());
    assert!(placements.iter().all(|p| p.candidate.confidence > 0.99));
}

#[test]
fn inverted_polarity_reads_the_same() {
    let order = [0, 1, 2, 2, 0, 1];
    let recognizer = recognizer(&[0, 1, 2], 1);
    let dark_on_light = page(&order, 2);
    let mut light_on_dark = dark_on_light.clone();
    image::imageops::invert(&mut light_on_dark);

    let a = recognizer.recognize(&png(&dark_on_light)).unwrap();
    let b = recognizer.recognize(&png(&light_on_dark)).unwrap();
    assert_eq!(a, b);
    assert_eq!(b, expected(&order));
}

#[test]
fn empty_template_dir_is_no_templates() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(TemplateLibrary::load(dir.path()), Err(XenoglyphError::NoTemplates)));

    let recognizer = Recognizer::new(TemplateLibrary::default());
    let err = recognizer.recognize(&png(&page(&[0], 1))).unwrap_err();
    assert!(matches!(err, XenoglyphError::NoTemplates));
}

#[test]
fn oversized_templates_are_searched_below_unit_scale() {
    // 48 px templates against a 24 px tall page of 12 px glyphs.
    let recognizer = recognizer(&[0, 1, 2], 4);
    let input = page(&[0, 1, 2], 1);
    assert!(input.height() < 48);

    let recognition = recognizer.recognize_with(&png(&input), &CancelToken::new()).unwrap();
    assert_eq!(recognition.scales.len(), 3);
    for &scale in &recognition.scales {
        assert!(scale > 0.2 && scale < 0.34, "scale was {scale}");
    }
    assert_eq!(recognition.symbols, "☂☔☀");
}

#[test]
fn settled_scale_is_reused_for_the_remaining_templates() {
    let all: Vec<usize> = (0..7).collect();
    let recognizer = recognizer(&all, 1);
    let recognition = recognizer
        .recognize_with(&png(&page(&all, 1)), &CancelToken::new())
        .unwrap();

    let converged = recognition.converged_scale.expect("scale should converge");
    approx::assert_relative_eq!(converged, 1.05, epsilon = 1e-9);
    assert_eq!(recognition.scales.len(), 7);
    assert_eq!(recognition.scales[6], converged);

    let symbols: HashSet<char> = recognition.symbols.chars().collect();
    assert_eq!(recognition.symbols.chars().count(), 7);
    assert_eq!(symbols.len(), 7);
    assert_eq!(recognition.symbols, expected(&all));
}

#[test]
fn sequential_and_parallel_collection_agree() {
    let order = [0, 1, 2, 2, 0, 1];
    let input = png(&page(&order, 2));
    let parallel = recognizer(&[0, 1, 2], 1);
    let sequential = parallel
        .clone()
        .with_config(RecognizerConfig { parallel: false, ..Default::default() });
    assert_eq!(parallel.recognize(&input).unwrap(), sequential.recognize(&input).unwrap());
}

#[test]
fn average_height_band_keeps_uniform_glyphs() {
    let order = [0, 1, 2, 2, 0, 1];
    let recognizer = recognizer(&[0, 1, 2], 1)
        .with_config(RecognizerConfig { height_band: HeightBand::Average, ..Default::default() });
    let recognition = recognizer
        .recognize_with(&png(&page(&order, 2)), &CancelToken::new())
        .unwrap();
    assert_eq!(recognition.symbols, expected(&order));
    let average = recognition.layout.average_height;
    for p in &recognition.layout.placements {
        assert!((p.candidate.height as i64 - average).abs() * 4 <= average);
    }
}

#[test]
fn blank_page_has_no_symbols() {
    let recognizer = recognizer(&[0, 1, 2], 1);
    let blank = GrayImage::from_pixel(60, 30, Luma([255]));
    assert_eq!(recognizer.recognize(&png(&blank)).unwrap(), "");
}

#[test]
fn cancelled_token_aborts_recognition() {
    let recognizer = recognizer(&[0, 1, 2], 1);
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = recognizer.recognize_with(&png(&page(&[0, 1, 2], 1)), &cancel).unwrap_err();
    assert!(matches!(err, XenoglyphError::Cancelled));
}

#[test]
fn in_memory_templates_match_loaded_ones() {
    let library = TemplateLibrary::from_templates(
        [0, 1, 2].iter().map(|&i| Template::new(SYMBOLS[i], glyph(i, 1))).collect(),
    );
    let symbols = Recognizer::new(library).recognize(&png(&page(&[2, 1, 0], 1))).unwrap();
    assert_eq!(symbols, "☀☔☂");
}

#[test]
fn wide_page_with_large_templates_finishes_promptly() {
    // 48 px templates over a 656 x 96 page.
    let order = [0, 1, 2, 0, 1, 2, 0, 1, 2, 0];
    let input = png(&page_at(&order, 1, 4));
    let recognizer = recognizer(&[0, 1, 2], 4);

    let started = Instant::now();
    let recognition = recognizer.recognize_with(&input, &CancelToken::new()).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(recognition.scales.len(), 3);
    assert!(elapsed < Duration::from_secs(60), "recognition took {elapsed:?}");
}
