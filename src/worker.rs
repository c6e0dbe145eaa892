// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A worker renders the bands a router sends it.  Each Request becomes
//! a job: the band is cut into tiles, the tiles are computed one after
//! another, and every finished tile goes back as a Response of its own.
//!
//! Receiving and computing run on separate threads, so a Cancel can
//! reach a job while it is being computed.  Jobs are computed one at a
//! time, in the order they arrived.  Every job's token is registered
//! under its identifier until the job ends; a Cancel sets it.

use crossbeam::channel;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::config::FractalKind;
use crate::error::{Error, Result};
use crate::generator::Generator;
use crate::partition::distribute;
use crate::raster::Raster;
use crate::router::error_report;
use crate::task::{CancellationToken, TaskOutcome};
use crate::transport::{Subscription, Transport};
use crate::wire::{Message, MessageType, RequestMessage, ResponseMessage, Wire};

/// The most pixels a worker will allocate for one Request unless told
/// otherwise: an 8192x8192 band.
pub const MAX_REQUEST_PIXELS: usize = 1 << 26;

/// A request waiting to be computed, with the token that stops it.
#[derive(Debug)]
pub struct Job {
    /// What to render.
    pub request: RequestMessage,
    /// Registered under the request's identifier.
    pub token: CancellationToken,
}

/// Renders requests into tile responses.
pub struct Worker<T> {
    transport: T,
    output: String,
    tile: (i64, i64),
    fractal: FractalKind,
    max_pixels: usize,
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl<T: Transport> Worker<T> {
    /// A worker rendering `fractal` in tiles of `tile` pixels and
    /// publishing them to `output`.
    pub fn new<S: Into<String>>(transport: T, output: S, tile: (i64, i64), fractal: FractalKind) -> Worker<T> {
        Worker {
            transport,
            output: output.into(),
            tile,
            fractal,
            max_pixels: MAX_REQUEST_PIXELS,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Refuse Requests covering more than `limit` pixels.
    pub fn with_max_pixels(self, limit: usize) -> Worker<T> {
        Worker {
            max_pixels: limit,
            ..self
        }
    }

    fn tokens(&self) -> MutexGuard<HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Identifiers of the jobs queued or computing.
    pub fn pending(&self) -> Vec<String> {
        self.tokens().keys().cloned().collect()
    }

    /// Acts on one incoming payload.  A Request is registered and handed
    /// back as a job to compute; a Cancel sets the token of its job.
    /// A Request too large to hold is refused before anything is
    /// registered.
    pub fn receive(&self, payload: &[u8]) -> Result<Option<Job>> {
        let message = Message::from_bytes(payload)?;
        debug!("worker: {} {}", message.kind(), message.identifier());
        match message {
            Message::Request(request) => {
                let pixels = request.header.pixel_view.len();
                if pixels > self.max_pixels {
                    return Err(Error::TooLarge {
                        pixels,
                        limit: self.max_pixels,
                    });
                }
                let token = CancellationToken::new();
                let previous = self
                    .tokens()
                    .insert(request.identifier().to_string(), token.clone());
                if previous.is_some() {
                    debug!("worker: job {} requested again", request.identifier());
                }
                Ok(Some(Job { request, token }))
            }
            Message::Cancel(cancel) => {
                match self.tokens().remove(cancel.identifier()) {
                    Some(token) => {
                        token.cancel();
                        info!("worker: job {} canceled", cancel.identifier());
                    }
                    None => debug!("worker: no job {} to cancel", cancel.identifier()),
                }
                Ok(None)
            }
            Message::Response(_) => Err(Error::UnexpectedMessageType {
                expected: MessageType::Request,
                found: MessageType::Response,
            }),
        }
    }

    /// Computes a job, publishing a Response for each tile it finishes.
    /// Returns how many tiles were published.
    pub fn compute(&self, job: Job) -> Result<usize> {
        let result = self.render(&job);
        let mut tokens = self.tokens();
        let ours = tokens
            .get(job.request.identifier())
            .map_or(false, |t| t.same_as(&job.token));
        if ours {
            tokens.remove(job.request.identifier());
        }
        result
    }

    fn render(&self, job: &Job) -> Result<usize> {
        let request = &job.request;
        let view = request.header.fractal_view();
        let mut raster = Raster::new(view.pixel_view);
        let tasks = distribute(request.identifier(), view, self.tile.0, self.tile.1, &job.token);
        let count = tasks.len();
        let generator = Generator::new(self.fractal.escape_function(request.max_iterations));

        let mut run = generator.run(tasks, &mut raster);
        let mut published = 0;
        while let Some(outcome) = run.next() {
            if let TaskOutcome::Completed(task) = outcome {
                let pixels = run.raster().extract(&task.tile_pixel_view);
                let response = ResponseMessage::new(task.identifier.clone(), task.tile_view(), pixels)?;
                self.transport.publish(&self.output, response.encode().as_bytes())?;
                published += 1;
            }
        }
        info!(
            "worker: job {} published {} of {} tiles",
            request.identifier(),
            published,
            count
        );
        Ok(published)
    }

    fn report(&self, e: &Error) {
        warn!("worker: {}", e);
        if let Err(e) = self.transport.publish(&self.output, error_report(e).as_bytes()) {
            warn!("worker: could not report failure: {}", e);
        }
    }

    /// Receives on `subscription` until it disconnects, computing jobs
    /// on a second thread.  Jobs already queued are finished first.
    pub fn serve(&self, subscription: Subscription) -> Result<()> {
        let (jobs, queue) = channel::unbounded::<Job>();
        crossbeam::scope(|scope| {
            scope.spawn(|_| {
                for job in queue.iter() {
                    if let Err(e) = self.compute(job) {
                        self.report(&e);
                    }
                }
            });
            while let Ok(payload) = subscription.recv() {
                match self.receive(&payload) {
                    Ok(Some(job)) => {
                        if jobs.send(job).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => self.report(&e),
                }
            }
            debug!("worker: {} closed", subscription.topic());
            drop(jobs);
        })
        .map_err(|_| Error::Panicked("worker"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::Mandelbrot;
    use crate::transport::Bus;
    use crate::view::{FractalView, View};
    use crate::wire::CancelMessage;

    fn setup() -> (Bus, Worker<Bus>, Subscription) {
        let bus = Bus::new();
        let results = bus.subscribe("results").unwrap();
        let worker = Worker::new(bus.clone(), "results", (16, 16), FractalKind::Mandelbrot);
        (bus, worker, results)
    }

    fn band() -> RequestMessage {
        let view = FractalView::new(View::new(0.0, 32.0, 48.0, 64.0), View::new(-2.0, -0.5, 1.0, 1.5));
        RequestMessage::new("job", view, 40).unwrap()
    }

    #[test]
    fn every_tile_comes_back_as_a_response() {
        let (_bus, worker, results) = setup();
        let job = worker.receive(band().encode().as_bytes()).unwrap().unwrap();
        assert_eq!(worker.pending(), vec!["job".to_string()]);
        assert_eq!(worker.compute(job).unwrap(), 6);
        assert!(worker.pending().is_empty());

        let view = band().header.fractal_view();
        let mut expected = Raster::new(view.pixel_view);
        let token = CancellationToken::new();
        Generator::new(Mandelbrot::new(40)).invoke(distribute("job", view, 0, 0, &token), &mut expected);

        let mut assembled = Raster::new(view.pixel_view);
        for payload in results.drain() {
            let response = ResponseMessage::decode(std::str::from_utf8(&payload).unwrap()).unwrap();
            assert_eq!(response.identifier(), "job");
            assert_eq!(response.buffer.width(), 16);
            assert_eq!(assembled.blit(&response.header.pixel_view, &response.buffer), 16 * 16);
        }
        assert_eq!(assembled, expected);
    }

    #[test]
    fn a_job_canceled_while_queued_publishes_nothing() {
        let (_bus, worker, results) = setup();
        let job = worker.receive(band().encode().as_bytes()).unwrap().unwrap();
        assert!(worker.receive(CancelMessage::new("job").unwrap().encode().as_bytes()).unwrap().is_none());
        assert!(job.token.is_canceled());
        assert_eq!(worker.compute(job).unwrap(), 0);
        assert!(results.drain().is_empty());
    }

    #[test]
    fn unknown_cancels_are_ignored() {
        let (_bus, worker, _results) = setup();
        let job = worker.receive(band().encode().as_bytes()).unwrap().unwrap();
        worker.receive(CancelMessage::new("other").unwrap().encode().as_bytes()).unwrap();
        assert!(!job.token.is_canceled());
    }

    #[test]
    fn oversized_requests_are_refused_unregistered() {
        let (_bus, worker, _results) = setup();
        let worker = worker.with_max_pixels(48 * 32 - 1);
        assert!(match worker.receive(band().encode().as_bytes()) {
            Err(Error::TooLarge { pixels, limit }) => pixels == 48 * 32 && limit == 48 * 32 - 1,
            _ => false,
        });
        assert!(worker.pending().is_empty());

        let huge = FractalView::new(View::sized(100_000, 100_000), View::new(-2.0, -2.0, 2.0, 2.0));
        let request = RequestMessage::new("huge", huge, 10).unwrap();
        assert!(worker.receive(request.encode().as_bytes()).is_err());
    }

    #[test]
    fn serve_reports_oversized_requests() {
        let (bus, worker, results) = setup();
        let worker = worker.with_max_pixels(100);
        let inbox = bus.subscribe("in").unwrap();
        bus.publish("in", band().encode().as_bytes()).unwrap();
        bus.close("in");
        worker.serve(inbox).unwrap();

        let payloads = results.drain();
        assert_eq!(payloads.len(), 1);
        let report = String::from_utf8(payloads[0].clone()).unwrap();
        assert_eq!(report, "error: request covers 1536 pixels, more than the 100 allowed");
    }

    #[test]
    fn responses_are_not_work() {
        let (_bus, worker, _results) = setup();
        let tile = FractalView::new(View::sized(1, 1), View::new(0.0, 0.0, 1.0, 1.0));
        let response = ResponseMessage::new("job", tile, crate::raster::ArgbBuffer::new(1, 1)).unwrap();
        assert!(worker.receive(response.encode().as_bytes()).is_err());
    }

    #[test]
    fn serve_reports_garbage_and_stops_when_closed() {
        let (bus, worker, results) = setup();
        let inbox = bus.subscribe("in").unwrap();
        bus.publish("in", b"not a message").unwrap();
        bus.publish("in", band().encode().as_bytes()).unwrap();
        bus.close("in");
        worker.serve(inbox).unwrap();

        let payloads = results.drain();
        assert_eq!(payloads.len(), 1 + 6);
        assert!(payloads[0].starts_with(b"error: "));
    }
}
