use thiserror::Error as ThisError;

use crate::adapter::{Adapter, AdapterError};
use crate::frame::{AggregateLen, DataType, CRLF};

/// Aggregates may nest this many levels deep. The bound keeps the parser
/// state small and makes hostile deeply-nested input a hard error instead
/// of unbounded growth.
pub const MAX_NESTING_DEPTH: usize = 5;

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid frame data type: {0:#04x}")]
    InvalidDataType(u8),
    #[error("malformed numeric header")]
    InvalidHeader,
    #[error("missing frame terminator")]
    MissingCrlf,
    #[error("aggregates nested deeper than {MAX_NESTING_DEPTH} levels are unsupported")]
    NestedAggregateUnsupported,
    #[error("stream part outside of a streamed string")]
    UnexpectedStreamPart,
    #[error("stream terminator outside of a streamed aggregate")]
    UnexpectedStreamEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Remaining {
    /// Wire frames left before this aggregate completes (declared count
    /// times multiplicity).
    Exact(usize),
    /// No declared count; completes on an end frame.
    Streamed,
}

#[derive(Debug)]
struct OpenNode {
    kind: DataType,
    remaining: Remaining,
}

#[derive(Clone, Copy, Debug)]
enum Bulk {
    None,
    /// A blob header announced `len` payload bytes plus CRLF.
    Pending { kind: DataType, len: usize },
}

/// Incremental RESP3 decoder for exactly one top-level value.
///
/// `advance` consumes as many whole protocol units (lines or bulk payloads)
/// as the buffer holds, delivering each to the adapter, and returns how many
/// bytes it used. It never consumes past the end of the current top-level
/// value and can be resumed with any split of the input, down to one byte at
/// a time. The parser owns no buffers and performs no I/O.
///
/// Adapter errors do not stop the frame: the first one is recorded, the
/// remaining events of the value are discarded, and the caller picks the
/// error up with [`Parser::take_sink_error`] once `done` reports true.
#[derive(Debug)]
pub struct Parser {
    stack: Vec<OpenNode>,
    bulk: Bulk,
    done: bool,
    sink_error: Option<AdapterError>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Parser {
        Parser {
            stack: Vec::with_capacity(MAX_NESTING_DEPTH),
            bulk: Bulk::None,
            done: false,
            sink_error: None,
        }
    }

    /// True once a whole top-level value has been consumed.
    pub fn done(&self) -> bool {
        self.done
    }

    /// The first error the adapter reported for this value, if any.
    pub fn take_sink_error(&mut self) -> Option<AdapterError> {
        self.sink_error.take()
    }

    /// Feeds the parser from `buf`, returning the number of bytes consumed.
    ///
    /// A return of zero with `done()` still false means more input is
    /// required; callers re-invoke with the unconsumed tail plus new bytes.
    pub fn advance(&mut self, buf: &[u8], sink: &mut dyn Adapter) -> Result<usize, ParseError> {
        let mut consumed = 0;
        while !self.done {
            let n = self.step(&buf[consumed..], sink)?;
            if n == 0 {
                break;
            }
            consumed += n;
        }
        Ok(consumed)
    }

    /// Consumes one protocol unit, or nothing if the buffer holds less than
    /// a unit.
    fn step(&mut self, buf: &[u8], sink: &mut dyn Adapter) -> Result<usize, ParseError> {
        if let Bulk::Pending { kind, len } = self.bulk {
            if buf.len() < len + 2 {
                return Ok(0);
            }
            if &buf[len..len + 2] != CRLF {
                return Err(ParseError::MissingCrlf);
            }
            self.bulk = Bulk::None;
            self.deliver_simple(sink, kind, &buf[..len]);
            if kind != DataType::StreamedStringPart {
                self.complete_value(sink);
            }
            return Ok(len + 2);
        }

        let Some(pos) = find_crlf(buf) else {
            return Ok(0);
        };
        let line = &buf[..pos];
        let consumed = pos + 2;

        if line.is_empty() {
            return Err(ParseError::InvalidHeader);
        }

        // End frame of a streamed aggregate.
        if line[0] == b'.' {
            let ends_aggregate = matches!(
                self.stack.last(),
                Some(node) if node.remaining == Remaining::Streamed && node.kind.is_aggregate()
            );
            if !ends_aggregate {
                return Err(ParseError::UnexpectedStreamEnd);
            }
            self.deliver_simple(sink, DataType::Invalid, b"");
            self.stack.pop();
            self.complete_value(sink);
            return Ok(consumed);
        }

        let kind = DataType::try_from(line[0])?;
        let datum = &line[1..];

        match kind {
            kind if kind.is_aggregate() => {
                match parse_count(datum)? {
                    AggregateLen::Streamed => {
                        self.deliver_aggregate(sink, kind, AggregateLen::Streamed);
                        self.open(kind, Remaining::Streamed)?;
                    }
                    AggregateLen::Count(count) => {
                        let frames = count
                            .checked_mul(kind.multiplicity())
                            .ok_or(ParseError::InvalidHeader)?;
                        self.deliver_aggregate(sink, kind, AggregateLen::Count(count));
                        if frames == 0 {
                            self.complete_value(sink);
                        } else {
                            self.open(kind, Remaining::Exact(frames))?;
                        }
                    }
                }
                Ok(consumed)
            }
            DataType::BulkString | DataType::BulkError | DataType::VerbatimString => {
                if datum == b"?" {
                    // A streamed string: chunk frames follow, ended by `;0`.
                    self.deliver_aggregate(sink, kind, AggregateLen::Streamed);
                    self.open(kind, Remaining::Streamed)?;
                    return Ok(consumed);
                }
                match parse_count(datum)? {
                    // RESP2 null bulk.
                    AggregateLen::Streamed => {
                        self.deliver_simple(sink, DataType::Null, b"");
                        self.complete_value(sink);
                    }
                    AggregateLen::Count(len) => {
                        self.bulk = Bulk::Pending { kind, len };
                    }
                }
                Ok(consumed)
            }
            DataType::StreamedStringPart => {
                let inside_streamed_string = matches!(
                    self.stack.last(),
                    Some(node) if node.remaining == Remaining::Streamed && node.kind.is_blob()
                );
                if !inside_streamed_string {
                    return Err(ParseError::UnexpectedStreamPart);
                }
                match parse_count(datum)? {
                    AggregateLen::Streamed => return Err(ParseError::InvalidHeader),
                    AggregateLen::Count(0) => {
                        self.deliver_simple(sink, DataType::Invalid, b"");
                        self.stack.pop();
                        self.complete_value(sink);
                    }
                    AggregateLen::Count(len) => {
                        self.bulk = Bulk::Pending { kind, len };
                    }
                }
                Ok(consumed)
            }
            _ => {
                // Simple line frame: the body is the whole datum.
                self.deliver_simple(sink, kind, datum);
                self.complete_value(sink);
                Ok(consumed)
            }
        }
    }

    fn open(&mut self, kind: DataType, remaining: Remaining) -> Result<(), ParseError> {
        if self.stack.len() == MAX_NESTING_DEPTH {
            return Err(ParseError::NestedAggregateUnsupported);
        }
        self.stack.push(OpenNode { kind, remaining });
        Ok(())
    }

    fn deliver_simple(&mut self, sink: &mut dyn Adapter, kind: DataType, text: &[u8]) {
        if self.sink_error.is_none() {
            if let Err(err) = sink.on_simple(kind, text, self.stack.len()) {
                self.sink_error = Some(err);
            }
        }
    }

    fn deliver_aggregate(&mut self, sink: &mut dyn Adapter, kind: DataType, len: AggregateLen) {
        if self.sink_error.is_none() {
            if let Err(err) = sink.on_aggregate(kind, len, self.stack.len()) {
                self.sink_error = Some(err);
            }
        }
    }

    /// One value finished: unwind completed aggregates and flag `done` when
    /// the stack empties.
    fn complete_value(&mut self, sink: &mut dyn Adapter) {
        loop {
            match self.stack.last_mut() {
                None => {
                    self.done = true;
                    sink.on_end();
                    break;
                }
                Some(node) => match &mut node.remaining {
                    Remaining::Streamed => break,
                    Remaining::Exact(frames) => {
                        *frames -= 1;
                        if *frames == 0 {
                            self.stack.pop();
                            continue;
                        }
                        break;
                    }
                },
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}

/// Parses an aggregate count or blob length. `-1` is the streamed /
/// null-bulk sentinel; anything non-numeric or below `-1` is malformed.
fn parse_count(datum: &[u8]) -> Result<AggregateLen, ParseError> {
    let text = std::str::from_utf8(datum).map_err(|_| ParseError::InvalidHeader)?;
    let value = text.parse::<i64>().map_err(|_| ParseError::InvalidHeader)?;
    match value {
        -1 => Ok(AggregateLen::Streamed),
        v if v < -1 => Err(ParseError::InvalidHeader),
        v => Ok(AggregateLen::Count(v as usize)),
    }
}
