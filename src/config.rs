// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Every tunable of a render, with the defaults the rest of the crate
//! assumes.

use num::Complex;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::escape::{EscapeFunction, Julia, Mandelbrot};
use crate::view::FractalView;
use crate::worker::MAX_REQUEST_PIXELS;

/// The constant of the default Julia set.
pub const JULIA_CONSTANT: Complex<f64> = Complex { re: -0.8, im: 0.156 };

/// Which escape-time fractal a worker renders.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FractalKind {
    /// `z ← z² + point`.
    Mandelbrot,
    /// `z ← z² + k`.
    Julia(Complex<f64>),
}

impl Default for FractalKind {
    fn default() -> FractalKind {
        FractalKind::Mandelbrot
    }
}

impl FractalKind {
    /// The escape function for this fractal under an iteration budget.
    pub fn escape_function(self, max_iterations: u32) -> Box<dyn EscapeFunction + Send + Sync> {
        match self {
            FractalKind::Mandelbrot => Box::new(Mandelbrot::new(max_iterations)),
            FractalKind::Julia(k) => Box::new(Julia::new(k, max_iterations)),
        }
    }
}

impl FromStr for FractalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<FractalKind, String> {
        match s.to_ascii_lowercase().as_str() {
            "mandelbrot" => Ok(FractalKind::Mandelbrot),
            "julia" => Ok(FractalKind::Julia(JULIA_CONSTANT)),
            other => Err(format!("unknown fractal {:?}", other)),
        }
    }
}

impl fmt::Display for FractalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FractalKind::Mandelbrot => f.write_str("mandelbrot"),
            FractalKind::Julia(k) => write!(f, "julia({})", k),
        }
    }
}

/// Bus topic names.  Workers each get their own topic, numbered from
/// zero under `workers`.
#[derive(Clone, Debug, PartialEq)]
pub struct Topics {
    /// Client to router: requests and cancels.
    pub requests: String,
    /// Router to client: forwarded responses and error reports.
    pub responses: String,
    /// Router to worker topic prefix.
    pub workers: String,
    /// Worker to router: tile responses.
    pub results: String,
}

impl Default for Topics {
    fn default() -> Topics {
        Topics {
            requests: "publisher/core".to_string(),
            responses: "core/publisher".to_string(),
            workers: "core/subscriber".to_string(),
            results: "subscriber/core".to_string(),
        }
    }
}

impl Topics {
    /// The topic of worker `n`.
    pub fn worker(&self, n: usize) -> String {
        format!("{}/{}", self.workers, n)
    }

    /// The static, ordered set of worker endpoints for `count` workers.
    pub fn worker_endpoints(&self, count: usize) -> Vec<String> {
        (0..count).map(|n| self.worker(n)).collect()
    }
}

/// How a router treats Cancel messages.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RouterSettings {
    /// Re-publish Cancels to every worker.  Off by default; the router
    /// then only logs them.
    pub forward_cancel: bool,
}

/// Everything one render needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Tile width in pixels, for a worker's partition.
    pub tile_width: i64,
    /// Tile height in pixels.
    pub tile_height: i64,
    /// Iteration budget per point.
    pub max_iterations: u32,
    /// Number of workers behind the router.
    pub workers: usize,
    /// The largest Request, in pixels, a worker accepts.
    pub max_request_pixels: usize,
    /// Bus topics.
    pub topics: Topics,
    /// Cancel handling.
    pub router: RouterSettings,
    /// The fractal rendered.
    pub fractal: FractalKind,
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Left edge on the complex plane.
    pub left: f64,
    /// Top edge on the complex plane.
    pub top: f64,
    /// Right edge on the complex plane; the bottom edge follows from
    /// the image's aspect ratio.
    pub right: f64,
    /// Where the finished image goes.
    pub output: PathBuf,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            tile_width: 128,
            tile_height: 128,
            max_iterations: 500,
            workers: num_cpus::get(),
            max_request_pixels: MAX_REQUEST_PIXELS,
            topics: Topics::default(),
            router: RouterSettings::default(),
            fractal: FractalKind::default(),
            width: 1024,
            height: 1024,
            left: -2.0,
            top: -2.0,
            right: 2.0,
            output: PathBuf::from("mandelbrot.ppm"),
        }
    }
}

impl Settings {
    /// The image's geometry.
    pub fn fractal_view(&self) -> FractalView {
        FractalView::fitted(self.width, self.height, self.left, self.top, self.right)
    }
}
