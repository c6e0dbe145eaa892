// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splitting work.  `split_across` is the coarse cut a router makes to
//! hand one band of rows to each worker; `distribute` is the fine cut a
//! worker makes to turn its band into generator tasks.

use itertools::iproduct;

use crate::task::{CancellationToken, Task};
use crate::view::{FractalView, View};
use crate::wire::RequestMessage;

/// Cuts a request into `workers` horizontal bands of equal height, top
/// to bottom.  Only the vertical extent changes; every band keeps the
/// original identifier and iteration budget.  Band edges are real
/// numbers when the height does not divide evenly.
pub fn split_across(request: &RequestMessage, workers: usize) -> Vec<RequestMessage> {
    if workers == 0 {
        return vec![];
    }
    let pixel = request.header.pixel_view;
    let complex = request.header.complex_view;
    let device_step = (pixel.bottom - pixel.top) / workers as f64;
    let complex_step = (complex.bottom - complex.top) / workers as f64;

    (0..workers)
        .map(|k| {
            let mut band = request.clone();
            band.header.pixel_view.top = pixel.top + k as f64 * device_step;
            band.header.pixel_view.bottom = band.header.pixel_view.top + device_step;
            band.header.complex_view.top = complex.top + k as f64 * complex_step;
            band.header.complex_view.bottom = band.header.complex_view.top + complex_step;
            band
        })
        .collect()
}

/// Given a tile count and an edge, the near edge of tile `i` and its far
/// edge; the last tile runs to the view's own far edge.
#[inline]
fn edges(near: f64, far: f64, step: f64, i: usize, count: usize) -> (f64, f64) {
    let start = near + i as f64 * step;
    let end = if i == count - 1 { far } else { start + step };
    (start, end)
}

/// Cuts `fractal_view` into a grid of tiles of `tile_width` by
/// `tile_height` pixels and returns one task per tile, column by column.
/// The last column and row absorb any remainder, so the tiles cover the
/// view exactly.  The complex plane is cut into an even grid of the
/// same shape.
///
/// A tile dimension that is not positive, or not smaller than the view,
/// yields a single task covering the whole view.
pub fn distribute(
    identifier: &str,
    fractal_view: FractalView,
    tile_width: i64,
    tile_height: i64,
    cancellation_token: &CancellationToken,
) -> Vec<Task> {
    let pixel = fractal_view.pixel_view;
    let complex = fractal_view.complex_view;
    let task = |tile_pixel_view, tile_complex_view| Task {
        identifier: identifier.to_string(),
        fractal_view,
        tile_pixel_view,
        tile_complex_view,
        cancellation_token: cancellation_token.clone(),
    };

    let (tw, th) = (tile_width as f64, tile_height as f64);
    if tile_width <= 0 || tile_height <= 0 || tw >= pixel.width() || th >= pixel.height() {
        return vec![task(pixel, complex)];
    }

    let rows = (pixel.height() / th).ceil() as usize;
    let cols = (pixel.width() / tw).ceil() as usize;
    let complex_width_interval = complex.width() / cols as f64;
    let complex_height_interval = complex.height() / rows as f64;

    iproduct!(0..cols, 0..rows)
        .map(|(i, j)| {
            let (left, right) = edges(pixel.left, pixel.right, tw, i, cols);
            let (top, bottom) = edges(pixel.top, pixel.bottom, th, j, rows);
            let (c_left, c_right) = edges(complex.left, complex.right, complex_width_interval, i, cols);
            let (c_top, c_bottom) = edges(complex.top, complex.bottom, complex_height_interval, j, rows);
            task(
                View::new(left, top, right, bottom),
                View::new(c_left, c_top, c_right, c_bottom),
            )
        })
        .collect()
}
