// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The client end of a job: tile Responses arrive in any order, from
//! any number of threads, and are merged into one full-image raster.

use log::{debug, warn};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::Result;
use crate::raster::{ArgbBuffer, Raster};
use crate::router::ERROR_PREFIX;
use crate::transport::Subscription;
use crate::view::View;
use crate::wire::{Message, ResponseMessage};

struct Canvas {
    raster: Raster,
    covered: Vec<bool>,
    delivered: usize,
}

impl Canvas {
    /// Writes `pixels` at `tile`.  Returns the pixels written, and how
    /// many of them had not been written before.
    fn paint(&mut self, tile: &View, pixels: &ArgbBuffer) -> (usize, usize) {
        let (mut written, mut fresh) = (0, 0);
        for (y, row) in tile.rows().enumerate() {
            for (x, column) in tile.columns().enumerate() {
                let index = match (pixels.get(x, y), self.raster.index_of(column, row)) {
                    (Some(color), Some(index)) => {
                        self.raster.set(column, row, color);
                        index
                    }
                    _ => continue,
                };
                written += 1;
                if !self.covered[index] {
                    self.covered[index] = true;
                    fresh += 1;
                }
            }
        }
        self.delivered += fresh;
        (written, fresh)
    }
}

/// Collects the Responses of one job into the image they make up.
pub struct Assembler {
    identifier: String,
    canvas: Mutex<Canvas>,
}

impl Assembler {
    /// An empty image covering `view`, accepting Responses for job
    /// `identifier` only.
    pub fn new<S: Into<String>>(identifier: S, view: View) -> Assembler {
        Assembler {
            identifier: identifier.into(),
            canvas: Mutex::new(Canvas {
                raster: Raster::new(view),
                covered: vec![false; view.len()],
                delivered: 0,
            }),
        }
    }

    fn canvas(&self) -> MutexGuard<Canvas> {
        self.canvas.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The job being assembled.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Writes a Response's pixels into the image.  Responses for other
    /// jobs are ignored; pixels outside the image are clipped.  Returns
    /// the number of pixels written, repeats included.
    pub fn merge(&self, response: &ResponseMessage) -> usize {
        if response.identifier() != self.identifier {
            debug!("assembler: ignoring response for job {}", response.identifier());
            return 0;
        }
        let tile = response.header.pixel_view;
        let offered = response.buffer.pixels().len();
        let (written, fresh) = self.canvas().paint(&tile, &response.buffer);
        if written < offered {
            warn!("assembler: clipped {} pixels of tile {:?}", offered - written, tile);
        }
        if fresh < written {
            debug!("assembler: {} pixels of tile {:?} arrived again", written - fresh, tile);
        }
        debug!("assembler: merged tile {:?}", tile);
        written
    }

    /// Decodes a payload off the bus and merges it if it is a Response.
    /// Error reports from the router are logged.
    pub fn accept(&self, payload: &[u8]) -> Result<usize> {
        if payload.starts_with(ERROR_PREFIX.as_bytes()) {
            warn!("assembler: {}", String::from_utf8_lossy(payload));
            return Ok(0);
        }
        match Message::from_bytes(payload)? {
            Message::Response(response) => Ok(self.merge(&response)),
            other => {
                debug!("assembler: ignoring {} {}", other.kind(), other.identifier());
                Ok(0)
            }
        }
    }

    /// Distinct pixels delivered so far.  A pixel delivered twice counts
    /// once.
    pub fn delivered(&self) -> usize {
        self.canvas().delivered
    }

    /// Has every pixel of the image arrived?
    pub fn is_complete(&self) -> bool {
        let canvas = self.canvas();
        canvas.delivered >= canvas.raster.buffer().pixels().len()
    }

    /// Merges Responses from `subscription` until the image is complete
    /// or nothing has arrived for `idle`.  Returns whether it completed.
    pub fn collect(&self, subscription: &Subscription, idle: Duration) -> Result<bool> {
        while !self.is_complete() {
            match subscription.recv_timeout(idle)? {
                Some(payload) => {
                    if let Err(e) = self.accept(&payload) {
                        warn!("assembler: {}", e);
                    }
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// A copy of the image as it stands.
    pub fn snapshot(&self) -> Raster {
        self.canvas().raster.clone()
    }

    /// Writes the image to `path`; see `Raster::export`.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.canvas().raster.export(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ArgbBuffer;
    use crate::view::FractalView;
    use crate::wire::Wire;

    fn response(id: &str, pixel: View, color: u32) -> ResponseMessage {
        let buffer = ArgbBuffer::filled(pixel.pixel_width(), pixel.pixel_height(), color);
        ResponseMessage::new(id, FractalView::new(pixel, View::new(0.0, 0.0, 1.0, 1.0)), buffer).unwrap()
    }

    #[test]
    fn tiles_merge_at_their_offsets() {
        let assembler = Assembler::new("job", View::sized(4, 4));
        assert_eq!(assembler.merge(&response("job", View::new(2.0, 0.0, 4.0, 2.0), 1)), 4);
        assert!(!assembler.is_complete());
        assert_eq!(assembler.merge(&response("job", View::new(0.0, 0.0, 2.0, 2.0), 2)), 4);
        assert_eq!(assembler.merge(&response("job", View::new(0.0, 2.0, 4.0, 4.0), 3)), 8);
        assert!(assembler.is_complete());
        let image = assembler.snapshot();
        assert_eq!(image.get(3, 1), Some(1));
        assert_eq!(image.get(0, 0), Some(2));
        assert_eq!(image.get(1, 3), Some(3));
    }

    #[test]
    fn a_repeated_tile_does_not_complete_the_image() {
        let assembler = Assembler::new("job", View::sized(4, 4));
        let top = response("job", View::new(0.0, 0.0, 4.0, 2.0), 6);
        assert_eq!(assembler.merge(&top), 8);
        assert_eq!(assembler.merge(&top), 8);
        assert_eq!(assembler.delivered(), 8);
        assert!(!assembler.is_complete());
        assert_eq!(assembler.merge(&response("job", View::new(1.0, 1.0, 3.0, 3.0), 7)), 4);
        assert_eq!(assembler.delivered(), 10);
        assert!(!assembler.is_complete());
        assert_eq!(assembler.merge(&response("job", View::new(0.0, 2.0, 4.0, 4.0), 8)), 8);
        assert!(assembler.is_complete());
        assert_eq!(assembler.snapshot().get(2, 2), Some(8));
    }

    #[test]
    fn other_jobs_are_ignored() {
        let assembler = Assembler::new("job", View::sized(2, 2));
        assert_eq!(assembler.merge(&response("other", View::sized(2, 2), 1)), 0);
        assert_eq!(assembler.delivered(), 0);
    }

    #[test]
    fn overhanging_tiles_are_clipped() {
        let assembler = Assembler::new("job", View::sized(4, 4));
        assert_eq!(assembler.merge(&response("job", View::new(3.0, 3.0, 6.0, 6.0), 9)), 1);
        assert_eq!(assembler.snapshot().get(3, 3), Some(9));
    }

    #[test]
    fn concurrent_merges_all_land() {
        let assembler = Assembler::new("job", View::sized(64, 64));
        crossbeam::scope(|scope| {
            for band in 0..8 {
                let assembler = &assembler;
                scope.spawn(move |_| {
                    let top = f64::from(band * 8);
                    assembler.merge(&response("job", View::new(0.0, top, 64.0, top + 8.0), band as u32));
                });
            }
        })
        .unwrap();
        assert!(assembler.is_complete());
        assert_eq!(assembler.snapshot().get(10, 63), Some(7));
    }

    #[test]
    fn accept_skips_reports_and_requests() {
        let assembler = Assembler::new("job", View::sized(2, 2));
        assert_eq!(assembler.accept(b"error: something broke").unwrap(), 0);
        let payload = response("job", View::sized(2, 2), 4).encode();
        assert_eq!(assembler.accept(payload.as_bytes()).unwrap(), 4);
        assert!(assembler.accept(b"zzz").is_err());
    }
}
