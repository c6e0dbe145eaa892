// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pixel storage.  An `ArgbBuffer` is a bare row-major block of packed
//! ARGB colors; a `Raster` places one on the pixel plane so that it can
//! be addressed with absolute pixel coordinates.

use image::pnm::PNMEncoder;
use image::pnm::{PNMSubtype, SampleEncoding};
use image::ColorType;
use log::debug;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::view::View;

/// A flat, row-major block of 32-bit ARGB colors indexed as
/// `x + y * width`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ArgbBuffer {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

#[inline]
fn channels(color: u32) -> [u8; 3] {
    [(color >> 16) as u8, (color >> 8) as u8, color as u8]
}

impl ArgbBuffer {
    /// A buffer of fully transparent black.
    pub fn new(width: usize, height: usize) -> ArgbBuffer {
        ArgbBuffer::filled(width, height, 0)
    }

    /// A buffer with every pixel set to `color`.
    pub fn filled(width: usize, height: usize, color: u32) -> ArgbBuffer {
        ArgbBuffer {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    /// Wraps existing pixels, which must number exactly `width * height`.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u32>) -> Result<ArgbBuffer> {
        if width.checked_mul(height) != Some(pixels.len()) {
            return Err(Error::BufferShape {
                width,
                height,
                found: pixels.len(),
            });
        }
        Ok(ArgbBuffer {
            width,
            height,
            pixels,
        })
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The pixels in storage order.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// The color at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.pixels[x + y * self.width])
        } else {
            None
        }
    }

    /// Sets the color at column `x`, row `y`.  Out-of-range writes are
    /// dropped and reported as `false`.
    pub fn set(&mut self, x: usize, y: usize, color: u32) -> bool {
        if x < self.width && y < self.height {
            self.pixels[x + y * self.width] = color;
            true
        } else {
            false
        }
    }

    /// Writes the buffer as a plain-text P3 pixmap.  The pixmap's origin
    /// is the bottom-left corner while the buffer's is the top-left, so
    /// rows go out last-first.  Alpha is dropped.
    pub fn write_ppm<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "P3\n{} {}\n255\n", self.width, self.height)?;
        for row in (0..self.height).rev() {
            let factor = row * self.width;
            for column in 0..self.width {
                let [r, g, b] = channels(self.pixels[column + factor]);
                writeln!(out, "{} {} {}", r, g, b)?;
            }
        }
        Ok(())
    }

    /// The P3 pixmap as a string.
    pub fn to_ppm(&self) -> String {
        let mut out = Vec::with_capacity(self.pixels.len() * 12 + 16);
        // Writing into a Vec cannot fail.
        let _ = self.write_ppm(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Packed 8-bit RGB, top row first, for the `image` encoders.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|&c| channels(c).to_vec()).collect()
    }
}

/// An ArgbBuffer placed on the pixel plane at the rectangle it covers.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    view: View,
    origin: (i64, i64),
    buffer: ArgbBuffer,
}

impl Raster {
    /// A transparent black raster covering the pixels of `view`.
    pub fn new(view: View) -> Raster {
        Raster::filled(view, 0)
    }

    /// A raster covering the pixels of `view`, every one set to `color`.
    pub fn filled(view: View, color: u32) -> Raster {
        Raster {
            view,
            origin: (view.columns().start, view.rows().start),
            buffer: ArgbBuffer::filled(view.pixel_width(), view.pixel_height(), color),
        }
    }

    /// The pixel rectangle covered.
    pub fn view(&self) -> View {
        self.view
    }

    /// The backing buffer.
    pub fn buffer(&self) -> &ArgbBuffer {
        &self.buffer
    }

    /// Consumes the raster, keeping only its pixels.
    pub fn into_buffer(self) -> ArgbBuffer {
        self.buffer
    }

    /// Buffer coordinates of an absolute pixel, if the raster covers it.
    #[inline]
    fn locate(&self, column: i64, row: i64) -> Option<(usize, usize)> {
        let x = column - self.origin.0;
        let y = row - self.origin.1;
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x < self.buffer.width && y < self.buffer.height {
            Some((x, y))
        } else {
            None
        }
    }

    /// Storage index of an absolute pixel, if the raster covers it.
    pub fn index_of(&self, column: i64, row: i64) -> Option<usize> {
        self.locate(column, row).map(|(x, y)| x + y * self.buffer.width)
    }

    /// The color at an absolute pixel.
    pub fn get(&self, column: i64, row: i64) -> Option<u32> {
        self.locate(column, row).and_then(|(x, y)| self.buffer.get(x, y))
    }

    /// Sets the color at an absolute pixel; pixels outside the raster
    /// are dropped and reported as `false`.
    #[inline]
    pub fn set(&mut self, column: i64, row: i64, color: u32) -> bool {
        match self.locate(column, row) {
            Some((x, y)) => self.buffer.set(x, y, color),
            None => false,
        }
    }

    /// Copies the pixels of `tile` into a buffer of their own.  Pixels
    /// of the tile that the raster does not cover come out transparent.
    pub fn extract(&self, tile: &View) -> ArgbBuffer {
        let mut out = ArgbBuffer::new(tile.pixel_width(), tile.pixel_height());
        for (y, row) in tile.rows().enumerate() {
            for (x, column) in tile.columns().enumerate() {
                if let Some(color) = self.get(column, row) {
                    out.set(x, y, color);
                }
            }
        }
        out
    }

    /// Writes `pixels` at the position of `tile`, clipping anything the
    /// raster does not cover.  Returns the number of pixels written.
    pub fn blit(&mut self, tile: &View, pixels: &ArgbBuffer) -> usize {
        let mut written = 0;
        for (y, row) in tile.rows().enumerate() {
            for (x, column) in tile.columns().enumerate() {
                if let Some(color) = pixels.get(x, y) {
                    if self.set(column, row, color) {
                        written += 1;
                    }
                }
            }
        }
        written
    }

    /// Writes the raster to disk.  A `.ppm` path gets the plain-text
    /// P3 form, a `.pnm` path a binary pixmap; anything else is handed
    /// to `image`, which picks the format from the extension.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let (width, height) = (self.buffer.width as u32, self.buffer.height as u32);
        debug!("exporting {}x{} raster to {}", width, height, path.display());
        match extension.as_ref().map(|e| e.as_str()) {
            Some("ppm") => {
                let mut output = BufWriter::new(File::create(path)?);
                self.buffer.write_ppm(&mut output)?;
                output.flush()?;
            }
            Some("pnm") => {
                let output = File::create(path)?;
                let mut encoder = PNMEncoder::new(output)
                    .with_subtype(PNMSubtype::Pixmap(SampleEncoding::Binary));
                encoder.encode(&self.buffer.to_rgb8()[..], width, height, ColorType::Rgb8)?;
            }
            _ => {
                image::save_buffer(path, &self.buffer.to_rgb8(), width, height, ColorType::Rgb8)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pixels_checks_the_shape() {
        assert!(ArgbBuffer::from_pixels(2, 2, vec![0; 4]).is_ok());
        assert!(ArgbBuffer::from_pixels(2, 2, vec![0; 5]).is_err());
    }

    #[test]
    fn ppm_is_emitted_bottom_row_first() {
        let buffer = ArgbBuffer::from_pixels(2, 2, vec![0xFF010203, 0xFF040506, 0x00070809, 0xFF0A0B0C])
            .unwrap();
        assert_eq!(
            buffer.to_ppm(),
            "P3\n2 2\n255\n7 8 9\n10 11 12\n1 2 3\n4 5 6\n"
        );
    }

    #[test]
    fn raster_is_addressed_absolutely() {
        let mut raster = Raster::new(View::new(10.0, 20.0, 14.0, 22.0));
        assert_eq!(raster.buffer().width(), 4);
        assert_eq!(raster.buffer().height(), 2);
        assert!(raster.set(13, 21, 7));
        assert!(!raster.set(14, 21, 7));
        assert!(!raster.set(9, 20, 7));
        assert_eq!(raster.buffer().pixels()[3 + 4], 7);
        assert_eq!(raster.get(13, 21), Some(7));
    }

    #[test]
    fn extract_then_blit_moves_a_tile() {
        let mut source = Raster::new(View::sized(8, 8));
        for row in 0..8 {
            for column in 0..8 {
                source.set(column, row, (column + row * 8) as u32);
            }
        }
        let tile = View::new(2.0, 4.0, 5.0, 8.0);
        let pixels = source.extract(&tile);
        assert_eq!(pixels.width(), 3);
        assert_eq!(pixels.height(), 4);
        assert_eq!(pixels.get(0, 0), Some(2 + 4 * 8));

        let mut target = Raster::new(View::sized(8, 8));
        assert_eq!(target.blit(&tile, &pixels), 12);
        assert_eq!(target.get(4, 7), source.get(4, 7));
        assert_eq!(target.get(1, 7), Some(0));
    }

    #[test]
    fn blit_clips_to_the_raster() {
        let mut target = Raster::new(View::sized(4, 4));
        let pixels = ArgbBuffer::filled(4, 4, 9);
        assert_eq!(target.blit(&View::new(2.0, 2.0, 6.0, 6.0), &pixels), 4);
        assert_eq!(target.get(3, 3), Some(9));
        assert_eq!(target.get(1, 1), Some(0));
    }

    #[test]
    fn export_writes_plain_ppm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ppm");
        let raster = Raster::filled(View::sized(3, 2), 0xFF102030);
        raster.export(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("P3\n3 2\n255\n16 32 48\n"));
        assert_eq!(text.lines().count(), 3 + 6);
    }

    #[test]
    fn export_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        Raster::filled(View::sized(3, 2), 0xFF102030).export(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
