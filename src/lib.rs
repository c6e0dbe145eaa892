#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tiled, distributed Mandelbrot rendering
//!
//! An image of an escape-time fractal is a mapping from a rectangle of
//! pixels to a rectangle of the complex plane, and every pixel can be
//! computed on its own.  That makes it easy to spread across machines:
//! a client sends a Request for the whole view, a router cuts it into
//! one horizontal band per worker, each worker cuts its band into tiles
//! and computes them one after another, and every finished tile travels
//! back as a Response that the client merges into the final image.
//!
//! All of those messages share one line-oriented text format (see
//! `wire`).  Workers can be told to stop a job at any time with a
//! Cancel; the tiles they have already sent stay sent.
//!
//! The pieces, bottom up:
//!
//! * `view`: rectangles and the pixel to complex mapping
//! * `raster`: ARGB pixel buffers and their export
//! * `wire`: the message codec
//! * `partition`: bands across workers, tiles within a band
//! * `escape` and `generator`: the per-pixel loop
//! * `transport`, `router`, `worker` and `assembler`: the nodes

extern crate crossbeam;
extern crate failure;
extern crate image;
extern crate itertools;
extern crate num;
extern crate num_cpus;
extern crate rand;

pub mod assembler;
pub mod config;
pub mod error;
pub mod escape;
pub mod generator;
pub mod partition;
pub mod raster;
pub mod router;
pub mod task;
pub mod transport;
pub mod view;
pub mod wire;
pub mod worker;

pub use assembler::Assembler;
pub use config::{FractalKind, RouterSettings, Settings, Topics};
pub use error::{Error, Result};
pub use escape::{EscapeFunction, Julia, Mandelbrot};
pub use generator::Generator;
pub use raster::{ArgbBuffer, Raster};
pub use router::Router;
pub use task::{CancellationToken, Task, TaskOutcome};
pub use transport::{Bus, Subscription, Transport};
pub use view::{FractalView, View};
pub use wire::{CancelMessage, Message, MessageType, RequestMessage, ResponseMessage, Wire};
pub use worker::Worker;
