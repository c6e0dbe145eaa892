// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The one error type shared by the codec, the message handlers and
//! the exporters.

use failure::Fail;
use std::io;

use crate::wire::MessageType;

/// Everything that can go wrong between a payload arriving and an image
/// landing on disk.  Cancellation is not here; it is a normal outcome.
#[derive(Debug, Fail)]
pub enum Error {
    /// The payload ran out of lines before the schema was satisfied.
    #[fail(display = "message ended before {} (line {})", field, line)]
    Truncated {
        /// The schema field being read.
        field: &'static str,
        /// One-based line number.
        line: usize,
    },

    /// A line did not parse as the schema required.
    #[fail(display = "malformed {} on line {}: {:?}", field, line, text)]
    Malformed {
        /// The schema field being read.
        field: &'static str,
        /// One-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },

    /// The leading type tag names no known message.
    #[fail(display = "unrecognized message type {}", _0)]
    UnknownMessageType(i64),

    /// A decoder for one message kind was handed another.
    #[fail(display = "expected a {} message, found {}", expected, found)]
    UnexpectedMessageType {
        /// What the caller asked for.
        expected: MessageType,
        /// What the payload said it was.
        found: MessageType,
    },

    /// The payload bytes are not text.
    #[fail(display = "payload is not valid UTF-8")]
    NotUtf8,

    /// An image buffer does not match the pixel view it travels with.
    #[fail(
        display = "buffer holds {} pixels but its pixel view covers {}x{}",
        found, width, height
    )]
    BufferShape {
        /// Columns the view covers.
        width: usize,
        /// Rows the view covers.
        height: usize,
        /// Pixels the buffer holds.
        found: usize,
    },

    /// A job identifier holds a line break, so it cannot be framed.
    #[fail(display = "identifier {:?} spans more than one line", _0)]
    BadIdentifier(String),

    /// A Request covers more pixels than this node will hold.
    #[fail(display = "request covers {} pixels, more than the {} allowed", pixels, limit)]
    TooLarge {
        /// Pixels the request's view covers.
        pixels: usize,
        /// The node's ceiling.
        limit: usize,
    },

    /// A Request arrived at a router with nowhere to send it.
    #[fail(display = "no worker endpoints to split job {} across", _0)]
    NoWorkers(String),

    /// Nobody is listening on the destination.
    #[fail(display = "no subscribers on topic {}", _0)]
    NoSuchTopic(String),

    /// Every sender of a subscription has gone away.
    #[fail(display = "topic {} disconnected", _0)]
    Disconnected(String),

    /// A compute or receive thread died.
    #[fail(display = "{} thread panicked", _0)]
    Panicked(&'static str),

    /// Writing an export failed.
    #[fail(display = "{}", _0)]
    Io(#[fail(cause)] io::Error),

    /// The image encoder refused the raster.
    #[fail(display = "image export failed: {}", _0)]
    Image(#[fail(cause)] image::ImageError),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Error {
        Error::Image(e)
    }
}

/// Crate-wide result.
pub type Result<T> = std::result::Result<T, Error>;
