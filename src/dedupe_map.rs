//! Dedupe map rendering.
//!
//! A dedupe map is a square image of a file's chunk sequence, each region
//! colored by the source file that first contributed the chunk. Regions in a
//! later file that keep the color of an earlier file are deduplicated
//! against it.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::{EstimateError, Result};

const IMAGE_DIM: usize = 256;
const BLOCK_DIM: usize = 8;
// Each color sample paints a 1x8 block, row-major.
const SEQUENCE_LEN: usize = (IMAGE_DIM / BLOCK_DIM) * IMAGE_DIM;

const PALETTE: [[f32; 3]; 16] = [
    [0.0, 255.0, 0.0],     // green
    [255.0, 0.0, 0.0],     // red
    [0.0, 0.0, 255.0],     // blue
    [255.0, 255.0, 0.0],   // yellow
    [255.0, 165.0, 0.0],   // orange
    [128.0, 0.0, 128.0],   // purple
    [0.0, 255.0, 255.0],   // cyan
    [255.0, 0.0, 255.0],   // magenta
    [192.0, 192.0, 192.0], // silver
    [128.0, 128.0, 128.0], // gray
    [128.0, 0.0, 0.0],     // maroon
    [128.0, 128.0, 0.0],   // olive
    [0.0, 128.0, 0.0],     // dark green
    [0.0, 128.0, 128.0],   // teal
    [0.0, 0.0, 128.0],     // navy
    [255.0, 105.0, 180.0], // hot pink
];

fn palette_color(segments: &[usize], index: isize) -> [f32; 3] {
    let clamped = index.clamp(0, segments.len() as isize - 1) as usize;
    PALETTE[segments[clamped] % PALETTE.len()]
}

/// Linearly interpolated palette sample at a fractional segment position.
fn sample(segments: &[usize], pos: f32) -> [f32; 3] {
    let base = pos.floor();
    let frac = pos - base;
    let left = palette_color(segments, base as isize);
    if frac == 0.0 {
        return left;
    }
    let right = palette_color(segments, base as isize + 1);
    [
        (1.0 - frac) * left[0] + frac * right[0],
        (1.0 - frac) * left[1] + frac * right[1],
        (1.0 - frac) * left[2] + frac * right[2],
    ]
}

/// Resamples the segment sequence down (or up) to `SEQUENCE_LEN` colors by
/// box-averaging the samples that fall into each slot.
fn color_sequence(segments: &[usize]) -> Vec<[u8; 3]> {
    let mut colors = Vec::with_capacity(SEQUENCE_LEN);
    let scale = segments.len() as f32 / SEQUENCE_LEN as f32;

    for slot in 0..SEQUENCE_LEN {
        let start = slot as f32 * scale;
        let end = (slot + 1) as f32 * scale;

        let mut acc = [0.0f32; 3];
        let mut weight = 0.0f32;
        let mut pos = start;
        while pos < end {
            let color = sample(segments, pos);
            acc[0] += color[0];
            acc[1] += color[1];
            acc[2] += color[2];
            weight += 1.0;
            pos += 1.0;
        }
        if weight == 0.0 {
            acc = sample(segments, start);
            weight = 1.0;
        }
        colors.push([
            (acc[0] / weight).clamp(0.0, 255.0) as u8,
            (acc[1] / weight).clamp(0.0, 255.0) as u8,
            (acc[2] / weight).clamp(0.0, 255.0) as u8,
        ]);
    }
    colors
}

/// Renders `segments` (first-seen source index per chunk, in boundary order)
/// as a 256x256 PNG at `path`. An empty sequence produces a blank map.
pub fn write_dedupe_map<P: AsRef<Path>>(segments: &[usize], path: P) -> Result<()> {
    let path = path.as_ref();
    let colors = if segments.is_empty() {
        vec![[255u8, 255, 255]; SEQUENCE_LEN]
    } else {
        color_sequence(segments)
    };

    let mut pixels = Vec::with_capacity(IMAGE_DIM * IMAGE_DIM * 3);
    for row in 0..IMAGE_DIM {
        for col in 0..IMAGE_DIM {
            let block = (row / BLOCK_DIM) * IMAGE_DIM + col;
            pixels.extend_from_slice(&colors[block]);
        }
    }

    let render_err = |source: png::EncodingError| EstimateError::MapRender {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|e| render_err(e.into()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), IMAGE_DIM as u32, IMAGE_DIM as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(render_err)?;
    writer.write_image_data(&pixels).map_err(render_err)?;
    Ok(())
}
