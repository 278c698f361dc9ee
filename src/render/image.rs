use std::path::Path;

use crate::error::{SplatError, SplatResult};
use crate::math::unpack_rgb;

/// Terminal cell colors: (upper pixel, lower pixel).
pub type HalfblockCell = ([u8; 3], [u8; 3]);

/// Displayable frame: packed `0x00RRGGBB`, row-major, origin top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl Image {
    pub fn new(width: usize, height: usize, background: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![background; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resize(&mut self, width: usize, height: usize, background: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width * height, background);
    }

    pub fn fill(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|&p| unpack_rgb(p)).collect()
    }

    pub fn save_png(&self, path: &Path) -> SplatResult<()> {
        let (width, height) = (self.width as u32, self.height as u32);
        let buffer = image::RgbImage::from_raw(width, height, self.to_rgb8()).ok_or_else(|| {
            SplatError::Image("pixel buffer does not match image size".to_string())
        })?;
        buffer
            .save(path)
            .map_err(|err| SplatError::Image(err.to_string()))?;
        tracing::info!("wrote {}x{} frame to {}", self.width, self.height, path.display());
        Ok(())
    }

    /// Averages `ss x ss` pixel blocks into half-block terminal cells: each
    /// cell shows one upper and one lower block.
    pub fn downsample_halfblock_into(
        &self,
        term_cols: usize,
        term_rows: usize,
        ss: usize,
        out: &mut Vec<HalfblockCell>,
    ) {
        let ss = ss.max(1);
        out.clear();
        out.resize(term_cols * term_rows, ([0; 3], [0; 3]));

        for term_row in 0..term_rows {
            let top_y0 = term_row * 2 * ss;
            let bot_y0 = top_y0 + ss;
            for term_col in 0..term_cols {
                let x0 = term_col * ss;
                let x1 = (x0 + ss).min(self.width);
                let top = self.block_average(x0, x1, top_y0, bot_y0.min(self.height));
                let bot_y1 = (bot_y0 + ss).min(self.height);
                let bottom = self.block_average(x0, x1, bot_y0.min(self.height), bot_y1);
                out[term_row * term_cols + term_col] = (top, bottom);
            }
        }
    }

    fn block_average(&self, x0: usize, x1: usize, y0: usize, y1: usize) -> [u8; 3] {
        let mut sum = [0u32; 3];
        let mut count = 0u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let p = unpack_rgb(self.pixels[y * self.width + x]);
                sum[0] += p[0] as u32;
                sum[1] += p[1] as u32;
                sum[2] += p[2] as u32;
                count += 1;
            }
        }
        if count == 0 {
            return [0, 0, 0];
        }
        [
            (sum[0] / count) as u8,
            (sum[1] / count) as u8,
            (sum[2] / count) as u8,
        ]
    }
}
