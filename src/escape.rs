// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Escape-time functions.  Each one takes a point on the complex
//! plane, iterates some recurrence on it, and measures how quickly
//! (if ever) the iterate leaves the circle of radius 2.  That
//! "velocity" is turned into a color.
//!
//! The iterate is seeded with the point itself rather than with zero,
//! which pre-applies one step: the escape count reported is one less
//! than the canonical count of a recurrence started at zero.

use num::Complex;

use crate::task::CancellationToken;

/// Returned for points that never escape, and for points abandoned to
/// cancellation.
pub const BLACK: u32 = 0x0000_0000;

/// Evaluate one complex point under a cancellable iteration budget and
/// yield a packed 32-bit ARGB color.
pub trait EscapeFunction {
    /// The color of `point`.  Implementations poll `cancel` as they
    /// iterate and return `BLACK` once it is set.
    fn evaluate(&self, point: Complex<f64>, cancel: &CancellationToken) -> u32;
}

impl<'a, F: EscapeFunction + ?Sized> EscapeFunction for &'a F {
    fn evaluate(&self, point: Complex<f64>, cancel: &CancellationToken) -> u32 {
        (**self).evaluate(point, cancel)
    }
}

impl<F: EscapeFunction + ?Sized> EscapeFunction for Box<F> {
    fn evaluate(&self, point: Complex<f64>, cancel: &CancellationToken) -> u32 {
        (**self).evaluate(point, cancel)
    }
}

/// Smooth polynomials for r, g, b.  `t` is how far through the budget
/// the point escaped, in `[0, 1)`; alpha is always opaque.
pub fn palette(t: f64) -> u32 {
    let u = 1.0 - t;
    let r = (9.0 * u * t * t * t * 255.0) as u32;
    let g = (15.0 * u * u * t * t * 255.0) as u32;
    let b = (8.5 * u * u * u * t * 255.0) as u32;
    (0xFF << 24) | ((r & 0xFF) << 16) | ((g & 0xFF) << 8) | (b & 0xFF)
}

/// The shared loop: starting from `z`, apply `step` up to `limit`
/// times, testing for escape before each step and for cancellation
/// after it.
#[inline]
fn iterate<S>(mut z: Complex<f64>, limit: u32, cancel: &CancellationToken, step: S) -> u32
where
    S: Fn(Complex<f64>) -> Complex<f64>,
{
    for i in 0..limit {
        if z.norm_sqr() > 4.0 {
            return palette(f64::from(i) / f64::from(limit));
        }
        z = step(z);
        if cancel.is_canceled() {
            return BLACK;
        }
    }
    BLACK
}

/// `z ← z² + c`, with `c` the point being colored.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Mandelbrot {
    /// Iteration budget per point.
    pub max_iterations: u32,
}

impl Mandelbrot {
    /// Constructor.
    pub fn new(max_iterations: u32) -> Mandelbrot {
        Mandelbrot { max_iterations }
    }
}

impl EscapeFunction for Mandelbrot {
    fn evaluate(&self, point: Complex<f64>, cancel: &CancellationToken) -> u32 {
        iterate(point, self.max_iterations, cancel, |z| z * z + point)
    }
}

/// `z ← z² + k` for a fixed constant `k`; the point being colored is
/// only the starting iterate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Julia {
    /// The constant added at every step.
    pub constant: Complex<f64>,
    /// Iteration budget per point.
    pub max_iterations: u32,
}

impl Julia {
    /// Constructor.
    pub fn new(constant: Complex<f64>, max_iterations: u32) -> Julia {
        Julia {
            constant,
            max_iterations,
        }
    }
}

impl EscapeFunction for Julia {
    fn evaluate(&self, point: Complex<f64>, cancel: &CancellationToken) -> u32 {
        let k = self.constant;
        iterate(point, self.max_iterations, cancel, |z| z * z + k)
    }
}
