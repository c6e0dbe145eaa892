// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The publish/subscribe boundary.  Routers and workers need only two
//! primitives from a message bus: publish a payload to a topic, and
//! receive the payloads published to a topic.  Delivery guarantees are
//! whatever the bus gives; this crate assumes none.
//!
//! `Bus` is an in-process implementation over crossbeam channels.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};

/// A publish/subscribe message bus.  Topics are opaque strings.
pub trait Transport: Send + Sync {
    /// Sends `payload` to every current subscriber of `topic`.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Starts receiving everything published to `topic` from now on.
    fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

impl<'a, T: Transport + ?Sized> Transport for &'a T {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        (**self).publish(topic, payload)
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription> {
        (**self).subscribe(topic)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        (**self).publish(topic, payload)
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription> {
        (**self).subscribe(topic)
    }
}

/// The receiving end of one subscription.
pub struct Subscription {
    topic: String,
    receiver: Receiver<Vec<u8>>,
}

impl Subscription {
    /// Wraps the receiving half of a channel fed with `topic`'s payloads.
    pub fn new<S: Into<String>>(topic: S, receiver: Receiver<Vec<u8>>) -> Subscription {
        Subscription {
            topic: topic.into(),
            receiver,
        }
    }

    /// The topic subscribed to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Blocks for the next payload.  Fails once the topic is closed and
    /// drained.
    pub fn recv(&self) -> Result<Vec<u8>> {
        self.receiver
            .recv()
            .map_err(|_| Error::Disconnected(self.topic.clone()))
    }

    /// Waits at most `timeout` for the next payload.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(payload) => Ok(Some(payload)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Disconnected(self.topic.clone())),
        }
    }

    /// Every payload already waiting, without blocking.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.receiver.try_iter().collect()
    }
}

type Topics = HashMap<String, Vec<Sender<Vec<u8>>>>;

/// An in-process bus.  Clones share one set of topics.
#[derive(Clone, Default)]
pub struct Bus {
    topics: Arc<Mutex<Topics>>,
}

impl Bus {
    /// A bus with no topics.
    pub fn new() -> Bus {
        Bus::default()
    }

    /// Forgets every subscriber of `topic`; their subscriptions finish
    /// once drained.
    pub fn close(&self, topic: &str) {
        if let Ok(mut topics) = self.topics.lock() {
            topics.remove(topic);
        }
    }

    /// Closes every topic.
    pub fn close_all(&self) {
        if let Ok(mut topics) = self.topics.lock() {
            topics.clear();
        }
    }
}

impl Transport for Bus {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        // A poisoned lock only means another publisher panicked; the map
        // itself is still whole.
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        let subscribers = match topics.get_mut(topic) {
            Some(subscribers) => subscribers,
            None => return Err(Error::NoSuchTopic(topic.to_string())),
        };
        subscribers.retain(|s| s.send(payload.to_vec()).is_ok());
        trace!("published {} bytes to {} ({} subscribers)", payload.len(), topic, subscribers.len());
        if subscribers.is_empty() {
            topics.remove(topic);
            return Err(Error::NoSuchTopic(topic.to_string()));
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let (sender, receiver) = channel::unbounded();
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.entry(topic.to_string()).or_insert_with(Vec::new).push(sender);
        Ok(Subscription::new(topic, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = Bus::new();
        let a = bus.subscribe("t").unwrap();
        let b = bus.subscribe("t").unwrap();
        bus.publish("t", b"hello").unwrap();
        assert_eq!(a.recv().unwrap(), b"hello".to_vec());
        assert_eq!(b.recv().unwrap(), b"hello".to_vec());
        assert_eq!(a.topic(), "t");
    }

    #[test]
    fn publishing_into_the_void_is_an_error() {
        let bus = Bus::new();
        assert!(bus.publish("nobody", b"x").is_err());
        let gone = bus.subscribe("t").unwrap();
        drop(gone);
        assert!(bus.publish("t", b"x").is_err());
    }

    #[test]
    fn closing_a_topic_ends_its_subscriptions() {
        let bus = Bus::new();
        let s = bus.subscribe("t").unwrap();
        bus.publish("t", b"last").unwrap();
        bus.close("t");
        assert_eq!(s.recv().unwrap(), b"last".to_vec());
        assert!(s.recv().is_err());
    }

    #[test]
    fn recv_timeout_reports_silence() {
        let bus = Bus::new();
        let s = bus.subscribe("t").unwrap();
        assert_eq!(s.recv_timeout(Duration::from_millis(5)).unwrap(), None);
        bus.publish("t", b"1").unwrap();
        bus.publish("t", b"2").unwrap();
        assert_eq!(s.drain().len(), 2);
    }
}
