// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contains the View rectangle and the FractalView, which describes a
//! relationship between a rectangle on the pixel plane and a rectangle
//! on the complex plane.  The same View shape serves both planes; only
//! the FractalView knows which is which.
use num::Complex;
use std::convert::TryFrom;
use std::ops::Range;

/// An axis-aligned rectangle.  Nothing requires `left < right` or
/// `top < bottom`; width and height are absolute, so a reversed
/// rectangle is legal and still has a non-negative size.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct View {
    /// The x coordinate of the left edge.
    pub left: f64,
    /// The y coordinate of the top edge.
    pub top: f64,
    /// The x coordinate of the right edge.
    pub right: f64,
    /// The y coordinate of the bottom edge.
    pub bottom: f64,
}

/// The integral pixels covered by the half-open real span `[lo, hi)`,
/// normalised so that a reversed span covers the same pixels.
fn span(a: f64, b: f64) -> Range<i64> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (lo.ceil() as i64)..(hi.ceil() as i64)
}

// Saturates, since edges read off the wire can be anything.
fn span_len(r: Range<i64>) -> usize {
    usize::try_from(r.end.saturating_sub(r.start)).unwrap_or(usize::MAX)
}

impl View {
    /// Constructor, in wire order.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> View {
        View {
            left,
            top,
            right,
            bottom,
        }
    }

    /// A view with its top-left corner at the origin.
    pub fn sized(width: usize, height: usize) -> View {
        View::new(0.0, 0.0, width as f64, height as f64)
    }

    /// `|right - left|`
    pub fn width(&self) -> f64 {
        (self.right - self.left).abs()
    }

    /// `|bottom - top|`
    pub fn height(&self) -> f64 {
        (self.bottom - self.top).abs()
    }

    /// The pixel columns this view covers when read as a pixel-space
    /// rectangle.
    pub fn columns(&self) -> Range<i64> {
        span(self.left, self.right)
    }

    /// The pixel rows this view covers when read as a pixel-space
    /// rectangle.
    pub fn rows(&self) -> Range<i64> {
        span(self.top, self.bottom)
    }

    /// Number of pixel columns covered.  Equal to `width()` for a
    /// rectangle with integral edges.
    pub fn pixel_width(&self) -> usize {
        span_len(self.columns())
    }

    /// Number of pixel rows covered.
    pub fn pixel_height(&self) -> usize {
        span_len(self.rows())
    }

    /// The total number of pixels covered.  Used to calculate memory
    /// needs, so it saturates rather than wrapping.
    pub fn len(&self) -> usize {
        self.pixel_width().saturating_mul(self.pixel_height())
    }

    /// Describes that the view covers no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.pixel_width() == 0 || self.pixel_height() == 0
    }
}

/// Contains the definitions of two planes: the pixel plane of an
/// image and the complex plane sampled into it.  Maps points from
/// one to the other.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FractalView {
    /// The rectangle on the pixel plane.
    pub pixel_view: View,
    /// The rectangle on the complex plane corresponding to `pixel_view`.
    pub complex_view: View,
}

impl FractalView {
    /// Constructor.  Takes the two rectangles as they travel on the wire.
    pub fn new(pixel_view: View, complex_view: View) -> FractalView {
        FractalView {
            pixel_view,
            complex_view,
        }
    }

    /// Given the pixel size of an image and the left, top and right
    /// edges of the complex plane, choose the bottom edge so that a
    /// pixel is square in both planes.
    pub fn fitted(width: usize, height: usize, left: f64, top: f64, right: f64) -> FractalView {
        let pixel_view = View::sized(width, height);
        let bottom = top + (right - left) * (pixel_view.height() / pixel_view.width());
        FractalView::new(pixel_view, View::new(left, top, right, bottom))
    }

    /// The ratio of complex width to pixel width, and of complex height
    /// to pixel height.  Always taken from the whole view so that every
    /// tile of one job shares one mapping.
    pub fn factors(&self) -> (f64, f64) {
        (
            self.complex_view.width() / self.pixel_view.width(),
            self.complex_view.height() / self.pixel_view.height(),
        )
    }

    /// Given the column and row of a pixel on the pixel plane, return
    /// the point on the complex plane it samples.  Coordinates are
    /// taken relative to the view's pixel origin, which maps to the
    /// complex view's left-top corner.
    pub fn pixel_to_point(&self, column: i64, row: i64) -> Complex<f64> {
        let (real_factor, imaginary_factor) = self.factors();
        self.point_with(real_factor, imaginary_factor, column, row)
    }

    /// `pixel_to_point` with precomputed factors, for inner loops.
    #[inline]
    pub(crate) fn point_with(
        &self,
        real_factor: f64,
        imaginary_factor: f64,
        column: i64,
        row: i64,
    ) -> Complex<f64> {
        Complex::new(
            self.complex_view.left + (column as f64 - self.pixel_view.left) * real_factor,
            self.complex_view.top + (row as f64 - self.pixel_view.top) * imaginary_factor,
        )
    }
}
