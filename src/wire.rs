// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The wire codec.
//!
//! Every message is newline-delimited text, one field per line, with no
//! lengths and no delimiters beyond the newline.  A reader consumes
//! exactly as many lines as the schema in hand demands; the schema is
//! chosen by the integer on the first line:
//!
//! ```text
//! 0  Request   header, pixel view, complex view, max iterations
//! 1  Response  header, pixel view, complex view, one ARGB per pixel
//! 2  Cancel    header
//! ```
//!
//! A header is the type tag and an identifier.  A view is four reals in
//! the order left, top, right, bottom.  A Response's pixels are not
//! sized on the wire; their count comes from its pixel view, rows
//! outermost.

use log::trace;
use rand::Rng;
use std::fmt;
use std::fmt::Write;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::raster::ArgbBuffer;
use crate::view::{FractalView, View};

/// The leading type tag of every message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Compute a view.
    Request,
    /// Pixels for a view.
    Response,
    /// Stop computing a job.
    Cancel,
}

impl MessageType {
    /// The integer written on the wire.
    pub fn tag(self) -> i64 {
        match self {
            MessageType::Request => 0,
            MessageType::Response => 1,
            MessageType::Cancel => 2,
        }
    }

    /// The message type for a wire tag.
    pub fn from_tag(tag: i64) -> Result<MessageType> {
        match tag {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Response),
            2 => Ok(MessageType::Cancel),
            _ => Err(Error::UnknownMessageType(tag)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// A fresh job identifier: 32 lowercase hex digits.
pub fn new_identifier() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}

/// Walks the lines of a payload, keeping count for error reports.
pub struct Lines<'a> {
    inner: std::str::Lines<'a>,
    line: usize,
}

impl<'a> Lines<'a> {
    /// Starts at the first line of `payload`.
    pub fn new(payload: &'a str) -> Lines<'a> {
        Lines {
            inner: payload.lines(),
            line: 0,
        }
    }

    fn next_line(&mut self, field: &'static str) -> Result<&'a str> {
        self.line += 1;
        match self.inner.next() {
            Some(text) => Ok(text),
            None => Err(Error::Truncated {
                field,
                line: self.line,
            }),
        }
    }

    fn parse<T: FromStr>(&mut self, field: &'static str) -> Result<T> {
        let text = self.next_line(field)?;
        text.trim().parse::<T>().map_err(|_| Error::Malformed {
            field,
            line: self.line,
            text: text.to_string(),
        })
    }

    fn text(&mut self, field: &'static str) -> Result<String> {
        self.next_line(field).map(|s| s.to_string())
    }

    fn argb(&mut self) -> Result<u32> {
        let value: i64 = self.parse("argb pixel")?;
        if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
            return Err(Error::Malformed {
                field: "argb pixel",
                line: self.line,
                text: value.to_string(),
            });
        }
        Ok(value as u32)
    }
}

/// Anything with a line-oriented wire form.
pub trait Wire: Sized {
    /// Appends the wire lines of `self` to `out`.
    fn write_to(&self, out: &mut String);

    /// Reads exactly the lines of one `Self`.
    fn read_from(lines: &mut Lines) -> Result<Self>;

    /// The complete wire form.
    fn encode(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Decodes a complete payload.
    fn decode(payload: &str) -> Result<Self> {
        Self::read_from(&mut Lines::new(payload))
    }
}

// Writing into a String cannot fail, so the fmt::Results below are dropped.
fn line<T: fmt::Display>(out: &mut String, value: T) {
    let _ = writeln!(out, "{}", value);
}

/// Type tag and job identifier.  The identifier is carried unchanged
/// through every split and clone of a job, and must not contain a
/// newline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    /// Which schema governs the rest of the message.
    pub kind: MessageType,
    /// Correlates every message of one job.
    pub identifier: String,
}

impl MessageHeader {
    /// Constructor.  Refuses an identifier that would not survive the
    /// trip through one wire line.
    pub fn new<S: Into<String>>(kind: MessageType, identifier: S) -> Result<MessageHeader> {
        let identifier = identifier.into();
        if identifier.contains(&['\n', '\r'][..]) {
            return Err(Error::BadIdentifier(identifier));
        }
        Ok(MessageHeader { kind, identifier })
    }

    fn require(self, kind: MessageType) -> Result<MessageHeader> {
        if self.kind != kind {
            return Err(Error::UnexpectedMessageType {
                expected: kind,
                found: self.kind,
            });
        }
        Ok(self)
    }
}

impl Wire for MessageHeader {
    fn write_to(&self, out: &mut String) {
        line(out, self.kind.tag());
        line(out, &self.identifier);
    }

    fn read_from(lines: &mut Lines) -> Result<MessageHeader> {
        let kind = MessageType::from_tag(lines.parse("message type")?)?;
        let identifier = lines.text("identifier")?;
        Ok(MessageHeader { kind, identifier })
    }
}

impl Wire for View {
    fn write_to(&self, out: &mut String) {
        line(out, self.left);
        line(out, self.top);
        line(out, self.right);
        line(out, self.bottom);
    }

    fn read_from(lines: &mut Lines) -> Result<View> {
        Ok(View {
            left: lines.parse("view left")?,
            top: lines.parse("view top")?,
            right: lines.parse("view right")?,
            bottom: lines.parse("view bottom")?,
        })
    }
}

/// A header followed by the pixel rectangle and the complex rectangle
/// it corresponds to.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoMessageHeader {
    /// Type tag and identifier.
    pub header: MessageHeader,
    /// A rectangle on the pixel plane.
    pub pixel_view: View,
    /// The complex plane rectangle matching `pixel_view`.
    pub complex_view: View,
}

impl GeoMessageHeader {
    /// Constructor.
    pub fn new(header: MessageHeader, pixel_view: View, complex_view: View) -> GeoMessageHeader {
        GeoMessageHeader {
            header,
            pixel_view,
            complex_view,
        }
    }

    /// Both rectangles as one mapping.
    pub fn fractal_view(&self) -> FractalView {
        FractalView::new(self.pixel_view, self.complex_view)
    }
}

impl Wire for GeoMessageHeader {
    fn write_to(&self, out: &mut String) {
        self.header.write_to(out);
        self.pixel_view.write_to(out);
        self.complex_view.write_to(out);
    }

    fn read_from(lines: &mut Lines) -> Result<GeoMessageHeader> {
        let header = MessageHeader::read_from(lines)?;
        GeoMessageHeader::read_rest(header, lines)
    }
}

impl GeoMessageHeader {
    fn read_rest(header: MessageHeader, lines: &mut Lines) -> Result<GeoMessageHeader> {
        let pixel_view = View::read_from(lines)?;
        let complex_view = View::read_from(lines)?;
        Ok(GeoMessageHeader::new(header, pixel_view, complex_view))
    }
}

/// Asks for the pixels of a view.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestMessage {
    /// Identifier and geometry.
    pub header: GeoMessageHeader,
    /// The iteration budget of the escape function.
    pub max_iterations: u32,
}

impl RequestMessage {
    /// A request for the pixels of `view`.
    pub fn new<S: Into<String>>(
        identifier: S,
        view: FractalView,
        max_iterations: u32,
    ) -> Result<RequestMessage> {
        Ok(RequestMessage {
            header: GeoMessageHeader::new(
                MessageHeader::new(MessageType::Request, identifier)?,
                view.pixel_view,
                view.complex_view,
            ),
            max_iterations,
        })
    }

    /// The job identifier.
    pub fn identifier(&self) -> &str {
        &self.header.header.identifier
    }

    fn read_rest(header: MessageHeader, lines: &mut Lines) -> Result<RequestMessage> {
        let header = GeoMessageHeader::read_rest(header.require(MessageType::Request)?, lines)?;
        let max_iterations = lines.parse("max iterations")?;
        Ok(RequestMessage {
            header,
            max_iterations,
        })
    }
}

impl Wire for RequestMessage {
    fn write_to(&self, out: &mut String) {
        self.header.write_to(out);
        line(out, self.max_iterations);
    }

    fn read_from(lines: &mut Lines) -> Result<RequestMessage> {
        let header = MessageHeader::read_from(lines)?;
        RequestMessage::read_rest(header, lines)
    }
}

const PREALLOCATED_PIXELS: usize = 1 << 16;

impl ArgbBuffer {
    /// Appends one line per pixel, rows outermost.  The size is not
    /// written; it travels in the accompanying pixel view.
    pub fn write_to(&self, out: &mut String) {
        for row in 0..self.height() {
            let factor = row * self.width();
            for column in 0..self.width() {
                line(out, self.pixels()[column + factor]);
            }
        }
    }

    /// Reads `width * height` pixel lines, rows outermost.  The size
    /// comes off the wire, so storage grows with the lines actually
    /// read rather than with the size claimed.
    pub fn read_sized(lines: &mut Lines, width: usize, height: usize) -> Result<ArgbBuffer> {
        let count = width.checked_mul(height).ok_or(Error::BufferShape {
            width,
            height,
            found: 0,
        })?;
        let mut pixels = Vec::with_capacity(count.min(PREALLOCATED_PIXELS));
        for _ in 0..count {
            pixels.push(lines.argb()?);
        }
        ArgbBuffer::from_pixels(width, height, pixels)
    }
}

/// The pixels of a view.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseMessage {
    /// Identifier and geometry.
    pub header: GeoMessageHeader,
    /// Exactly the pixels `header.pixel_view` covers.
    pub buffer: ArgbBuffer,
}

impl ResponseMessage {
    /// Packages pixels for `view`; the buffer must be the size the pixel
    /// view covers.
    pub fn new<S: Into<String>>(
        identifier: S,
        view: FractalView,
        buffer: ArgbBuffer,
    ) -> Result<ResponseMessage> {
        let (width, height) = (view.pixel_view.pixel_width(), view.pixel_view.pixel_height());
        if buffer.width() != width || buffer.height() != height {
            return Err(Error::BufferShape {
                width,
                height,
                found: buffer.pixels().len(),
            });
        }
        Ok(ResponseMessage {
            header: GeoMessageHeader::new(
                MessageHeader::new(MessageType::Response, identifier)?,
                view.pixel_view,
                view.complex_view,
            ),
            buffer,
        })
    }

    /// The job identifier.
    pub fn identifier(&self) -> &str {
        &self.header.header.identifier
    }

    fn read_rest(header: MessageHeader, lines: &mut Lines) -> Result<ResponseMessage> {
        let header = GeoMessageHeader::read_rest(header.require(MessageType::Response)?, lines)?;
        let buffer = ArgbBuffer::read_sized(
            lines,
            header.pixel_view.pixel_width(),
            header.pixel_view.pixel_height(),
        )?;
        Ok(ResponseMessage { header, buffer })
    }
}

impl Wire for ResponseMessage {
    fn write_to(&self, out: &mut String) {
        self.header.write_to(out);
        self.buffer.write_to(out);
    }

    fn read_from(lines: &mut Lines) -> Result<ResponseMessage> {
        let header = MessageHeader::read_from(lines)?;
        ResponseMessage::read_rest(header, lines)
    }
}

/// Stops a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelMessage {
    /// Names the job.
    pub header: MessageHeader,
}

impl CancelMessage {
    /// Cancels the job `identifier`.
    pub fn new<S: Into<String>>(identifier: S) -> Result<CancelMessage> {
        Ok(CancelMessage {
            header: MessageHeader::new(MessageType::Cancel, identifier)?,
        })
    }

    /// The job identifier.
    pub fn identifier(&self) -> &str {
        &self.header.identifier
    }
}

impl Wire for CancelMessage {
    fn write_to(&self, out: &mut String) {
        self.header.write_to(out);
    }

    fn read_from(lines: &mut Lines) -> Result<CancelMessage> {
        let header = MessageHeader::read_from(lines)?.require(MessageType::Cancel)?;
        Ok(CancelMessage { header })
    }
}

/// Any message, chosen by its leading type tag.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Tag 0.
    Request(RequestMessage),
    /// Tag 1.
    Response(ResponseMessage),
    /// Tag 2.
    Cancel(CancelMessage),
}

impl Message {
    /// Decodes raw payload bytes.
    pub fn from_bytes(payload: &[u8]) -> Result<Message> {
        let text = std::str::from_utf8(payload).map_err(|_| Error::NotUtf8)?;
        Message::decode(text)
    }

    /// The wire form as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode().into_bytes()
    }

    /// Which schema this message follows.
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Request(_) => MessageType::Request,
            Message::Response(_) => MessageType::Response,
            Message::Cancel(_) => MessageType::Cancel,
        }
    }

    /// The job identifier.
    pub fn identifier(&self) -> &str {
        match self {
            Message::Request(m) => m.identifier(),
            Message::Response(m) => m.identifier(),
            Message::Cancel(m) => m.identifier(),
        }
    }
}

impl Wire for Message {
    fn write_to(&self, out: &mut String) {
        match self {
            Message::Request(m) => m.write_to(out),
            Message::Response(m) => m.write_to(out),
            Message::Cancel(m) => m.write_to(out),
        }
    }

    fn read_from(lines: &mut Lines) -> Result<Message> {
        let header = MessageHeader::read_from(lines)?;
        trace!("decoding {} message {}", header.kind, header.identifier);
        match header.kind {
            MessageType::Request => RequestMessage::read_rest(header, lines).map(Message::Request),
            MessageType::Response => {
                ResponseMessage::read_rest(header, lines).map(Message::Response)
            }
            MessageType::Cancel => Ok(Message::Cancel(CancelMessage { header })),
        }
    }
}

impl From<RequestMessage> for Message {
    fn from(m: RequestMessage) -> Message {
        Message::Request(m)
    }
}

impl From<ResponseMessage> for Message {
    fn from(m: ResponseMessage) -> Message {
        Message::Response(m)
    }
}

impl From<CancelMessage> for Message {
    fn from(m: CancelMessage) -> Message {
        Message::Cancel(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_view() -> FractalView {
        FractalView::new(View::sized(256, 256), View::new(-2.0, -2.0, 2.0, 2.0))
    }

    #[test]
    fn request_has_the_documented_layout() {
        let request = RequestMessage::new("0", full_view(), 64).unwrap();
        assert_eq!(request.encode(), "0\n0\n0\n0\n256\n256\n-2\n-2\n2\n2\n64\n");
    }

    #[test]
    fn request_decodes_from_foreign_float_text() {
        let payload = "0\njob\n0.0\n0.0\n256.0\n256.0\n-2.0\n-2.0\n2.0\n2.0\n512\n";
        let request = RequestMessage::decode(payload).unwrap();
        assert_eq!(request.identifier(), "job");
        assert_eq!(request.header.fractal_view(), full_view());
        assert_eq!(request.max_iterations, 512);
    }

    #[test]
    fn request_roundtrip_keeps_full_precision() {
        let view = FractalView::new(
            View::new(0.0, 256.0 / 3.0, 255.5, 170.666_666_666_666_66),
            View::new(-0.743_643_887_037_151, 0.131_825_904_205_33, 1e-17, -3.5e10),
        );
        let request = RequestMessage::new(new_identifier(), view, 100_000).unwrap();
        assert_eq!(RequestMessage::decode(&request.encode()).unwrap(), request);
    }

    #[test]
    fn response_roundtrip() {
        let view = FractalView::new(View::new(64.0, 0.0, 67.0, 2.0), View::new(-1.0, -2.0, 0.0, -1.0));
        let buffer = ArgbBuffer::from_pixels(3, 2, vec![0, 1, 0xFFFF_FFFF, 0xFF00_0000, 7, 42]).unwrap();
        let response = ResponseMessage::new("abc", view, buffer).unwrap();
        let text = response.encode();
        assert_eq!(text.lines().count(), 10 + 6);
        assert!(text.ends_with("\n0\n1\n4294967295\n4278190080\n7\n42\n"));
        assert_eq!(ResponseMessage::decode(&text).unwrap(), response);
    }

    #[test]
    fn response_rejects_a_mismatched_buffer() {
        let r = ResponseMessage::new("x", full_view(), ArgbBuffer::new(2, 2));
        assert!(match r {
            Err(Error::BufferShape { width: 256, .. }) => true,
            _ => false,
        });
    }

    #[test]
    fn negative_argb_lines_are_twos_complement() {
        let payload = "1\nx\n0\n0\n2\n1\n0\n0\n1\n1\n-16777216\n-1\n";
        let response = ResponseMessage::decode(payload).unwrap();
        assert_eq!(response.buffer.pixels(), &[0xFF00_0000, 0xFFFF_FFFF]);
    }

    #[test]
    fn cancel_roundtrip() {
        let cancel = CancelMessage::new("00000000000000000000000000000003").unwrap();
        assert_eq!(cancel.encode(), "2\n00000000000000000000000000000003\n");
        assert_eq!(CancelMessage::decode(&cancel.encode()).unwrap(), cancel);
    }

    #[test]
    fn dispatch_follows_the_leading_tag() {
        let request: Message = RequestMessage::new("r", full_view(), 10).unwrap().into();
        let cancel: Message = CancelMessage::new("c").unwrap().into();
        assert_eq!(Message::from_bytes(&request.to_bytes()).unwrap(), request);
        assert_eq!(Message::from_bytes(&cancel.to_bytes()).unwrap().kind(), MessageType::Cancel);
        assert_eq!(Message::decode("2\nc\r\n").unwrap().identifier(), "c");
    }

    #[test]
    fn unknown_tags_are_refused() {
        assert!(match Message::decode("7\nx\n") {
            Err(Error::UnknownMessageType(7)) => true,
            _ => false,
        });
    }

    #[test]
    fn typed_decoders_refuse_other_kinds() {
        assert!(match RequestMessage::decode("2\nx\n") {
            Err(Error::UnexpectedMessageType {
                expected: MessageType::Request,
                found: MessageType::Cancel,
            }) => true,
            _ => false,
        });
    }

    #[test]
    fn short_payloads_are_truncated() {
        assert!(match Message::decode("0\nx\n0\n0\n") {
            Err(Error::Truncated { field: "view right", line: 5 }) => true,
            _ => false,
        });
        assert!(match Message::decode("1\nx\n0\n0\n2\n1\n0\n0\n1\n1\n5\n") {
            Err(Error::Truncated { field: "argb pixel", line: 12 }) => true,
            _ => false,
        });
    }

    #[test]
    fn huge_claimed_tiles_fail_on_the_first_missing_pixel() {
        // 10^10 pixels claimed, none sent.
        assert!(match Message::decode("1\nx\n0\n0\n100000\n100000\n0\n0\n1\n1\n") {
            Err(Error::Truncated { field: "argb pixel", line: 11 }) => true,
            _ => false,
        });
    }

    #[test]
    fn overflowing_tile_sizes_are_refused() {
        let payload = "1\nx\n0\n0\n1e300\n1e300\n0\n0\n1\n1\n0\n";
        assert!(match Message::decode(payload) {
            Err(Error::BufferShape { found: 0, .. }) => true,
            _ => false,
        });
    }

    #[test]
    fn identifiers_must_fit_on_one_line() {
        assert!(match CancelMessage::new("two\nlines") {
            Err(Error::BadIdentifier(ref id)) => id == "two\nlines",
            _ => false,
        });
        assert!(RequestMessage::new("cr\r", full_view(), 10).is_err());
        let buffer = ArgbBuffer::new(256, 256);
        assert!(ResponseMessage::new("a\nb", full_view(), buffer).is_err());
    }

    #[test]
    fn malformed_lines_name_the_field() {
        assert!(match Message::decode("0\nx\n0\nzero\n") {
            Err(Error::Malformed { field: "view top", line: 4, .. }) => true,
            _ => false,
        });
        assert!(match Message::decode("banana\n") {
            Err(Error::Malformed { field: "message type", line: 1, .. }) => true,
            _ => false,
        });
        assert!(Message::from_bytes(&[0x30, 0x0a, 0xff, 0xfe]).is_err());
    }

    #[test]
    fn identifiers_are_32_hex_digits() {
        let id = new_identifier();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_identifier());
    }
}
