// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The router sits between the client and the workers.  A Request is
//! cut into one band per worker and each band goes to its own worker
//! topic; a Response is passed on to the client untouched.  Cancels are
//! logged and dropped unless forwarding is switched on.
//!
//! Nothing that arrives can take the router down: a payload that does
//! not decode, or a publish that fails, is logged and reported to the
//! client as a line of text starting with `error: `.

use log::{debug, info, warn};

use crate::config::RouterSettings;
use crate::error::{Error, Result};
use crate::partition::split_across;
use crate::transport::{Subscription, Transport};
use crate::wire::{Message, Wire};

/// Leads every failure report sent to an output topic.
pub const ERROR_PREFIX: &str = "error: ";

/// The text sent to the output topic when handling a payload fails.
pub fn error_report<E: std::fmt::Display>(e: &E) -> String {
    format!("{}{}", ERROR_PREFIX, e)
}

/// Fans requests out to workers and responses back in.
pub struct Router<T> {
    transport: T,
    workers: Vec<String>,
    output: String,
    settings: RouterSettings,
}

impl<T: Transport> Router<T> {
    /// A router publishing bands to `workers`, in order, and responses
    /// to `output`.
    pub fn new<S: Into<String>>(
        transport: T,
        workers: Vec<String>,
        output: S,
        settings: RouterSettings,
    ) -> Router<T> {
        Router {
            transport,
            workers,
            output: output.into(),
            settings,
        }
    }

    /// The worker endpoints, in split order.
    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    /// Handles one payload, reporting any failure to the output topic
    /// instead of returning it.
    pub fn handle(&self, payload: &[u8]) {
        if let Err(e) = self.dispatch(payload) {
            warn!("router: {}", e);
            let report = error_report(&e);
            if let Err(e) = self.transport.publish(&self.output, report.as_bytes()) {
                warn!("router: could not report failure: {}", e);
            }
        }
    }

    /// Decodes and acts on one payload.
    pub fn dispatch(&self, payload: &[u8]) -> Result<()> {
        // Reports from workers go straight on to the client.
        if payload.starts_with(ERROR_PREFIX.as_bytes()) {
            return self.transport.publish(&self.output, payload);
        }
        let message = Message::from_bytes(payload)?;
        debug!("router: {} {}", message.kind(), message.identifier());
        match message {
            Message::Request(request) => {
                if self.workers.is_empty() {
                    return Err(Error::NoWorkers(request.identifier().to_string()));
                }
                let bands = split_across(&request, self.workers.len());
                info!(
                    "router: job {} split across {} workers",
                    request.identifier(),
                    bands.len()
                );
                for (band, worker) in bands.iter().zip(&self.workers) {
                    self.transport.publish(worker, band.encode().as_bytes())?;
                }
            }
            Message::Response(_) => {
                self.transport.publish(&self.output, payload)?;
            }
            Message::Cancel(cancel) => {
                if self.settings.forward_cancel {
                    info!("router: forwarding cancel of job {}", cancel.identifier());
                    for worker in &self.workers {
                        self.transport.publish(worker, payload)?;
                    }
                } else {
                    info!("router: cancel of job {} not forwarded", cancel.identifier());
                }
            }
        }
        Ok(())
    }

    /// Handles every payload on `subscription` until it disconnects.
    pub fn serve(&self, subscription: Subscription) {
        while let Ok(payload) = subscription.recv() {
            self.handle(&payload);
        }
        debug!("router: {} closed", subscription.topic());
    }
}
