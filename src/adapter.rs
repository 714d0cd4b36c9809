use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use bytes::Bytes;
use thiserror::Error as ThisError;

use crate::frame::{AggregateLen, DataType, Frame};

/// Errors an adapter can report while materializing a response.
///
/// These are per-response: the connection fails the owning request with the
/// first one recorded and keeps the wire healthy by draining the rest of the
/// offending frame.
#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("expects a simple frame")]
    ExpectsSimpleType,
    #[error("expects an aggregate frame")]
    ExpectsAggregate,
    #[error("expects a map-like aggregate")]
    ExpectsMapLikeAggregate,
    #[error("expects a set-like aggregate")]
    ExpectsSetAggregate,
    #[error("server error: {0}")]
    SimpleError(String),
    #[error("server blob error: {0}")]
    BlobError(String),
    #[error("unexpected null")]
    Null,
    #[error("aggregate of {actual} elements does not fit a target of {expected}")]
    IncompatibleSize { expected: usize, actual: usize },
    #[error("streamed aggregates unsupported by this adapter")]
    StreamedUnsupported,
    #[error("value conversion failed: {0}")]
    Conversion(String),
    #[error("unexpected frame")]
    Unexpected,
}

/// A sink driven by the parser with the pre-order node stream of one or
/// more top-level values.
///
/// `depth` is the nesting level of the node; `on_end` fires once per
/// completed top-level value, which is what lets tuple adapters advance to
/// their next slot.
pub trait Adapter: Send {
    fn on_simple(&mut self, kind: DataType, text: &[u8], depth: usize)
        -> Result<(), AdapterError>;

    fn on_aggregate(
        &mut self,
        kind: DataType,
        len: AggregateLen,
        depth: usize,
    ) -> Result<(), AdapterError>;

    fn on_end(&mut self) {}
}

/// Maps server-origin error frames and nulls to their error codes; other
/// frames pass through for conversion.
fn reject_special(kind: DataType, text: &[u8]) -> Result<(), AdapterError> {
    match kind {
        DataType::SimpleError => Err(AdapterError::SimpleError(lossy(text))),
        DataType::BulkError => Err(AdapterError::BlobError(lossy(text))),
        DataType::Null => Err(AdapterError::Null),
        _ => Ok(()),
    }
}

fn lossy(text: &[u8]) -> String {
    String::from_utf8_lossy(text).into_owned()
}

fn utf8(text: &[u8]) -> Result<String, AdapterError> {
    std::str::from_utf8(text)
        .map(str::to_owned)
        .map_err(|_| AdapterError::Conversion(lossy(text)))
}

/// Drops the format prefix (`txt:` / `mkd:`) of a verbatim string.
fn strip_verbatim(text: &[u8]) -> &[u8] {
    match text.get(3) {
        Some(b':') => &text[4..],
        _ => text,
    }
}

/// Converts the text body of a simple frame into a value.
pub trait FromSimple: Sized + Send + 'static {
    fn from_simple(kind: DataType, text: &[u8]) -> Result<Self, AdapterError>;
}

impl FromSimple for String {
    fn from_simple(kind: DataType, text: &[u8]) -> Result<Self, AdapterError> {
        reject_special(kind, text)?;
        let body = match kind {
            DataType::VerbatimString => strip_verbatim(text),
            _ => text,
        };
        utf8(body)
    }
}

impl FromSimple for Bytes {
    fn from_simple(kind: DataType, text: &[u8]) -> Result<Self, AdapterError> {
        reject_special(kind, text)?;
        let body = match kind {
            DataType::VerbatimString => strip_verbatim(text),
            _ => text,
        };
        Ok(Bytes::copy_from_slice(body))
    }
}

macro_rules! from_simple_via_parse {
    ($($t:ty),+) => {
        $(
            impl FromSimple for $t {
                fn from_simple(kind: DataType, text: &[u8]) -> Result<Self, AdapterError> {
                    reject_special(kind, text)?;
                    std::str::from_utf8(text)
                        .ok()
                        .and_then(|s| s.parse::<$t>().ok())
                        .ok_or_else(|| AdapterError::Conversion(lossy(text)))
                }
            }
        )+
    };
}

// i128 covers big numbers; f64 accepts the protocol's inf/-inf/nan texts.
from_simple_via_parse!(i64, u64, i128, f64);

impl FromSimple for bool {
    fn from_simple(kind: DataType, text: &[u8]) -> Result<Self, AdapterError> {
        reject_special(kind, text)?;
        match text {
            b"t" => Ok(true),
            b"f" => Ok(false),
            _ => Err(AdapterError::Conversion(lossy(text))),
        }
    }
}

impl<T: FromSimple> FromSimple for Option<T> {
    fn from_simple(kind: DataType, text: &[u8]) -> Result<Self, AdapterError> {
        if kind == DataType::Null {
            return Ok(None);
        }
        T::from_simple(kind, text).map(Some)
    }
}

/// Accepts anything and drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ignore;

impl Adapter for Ignore {
    fn on_simple(&mut self, _: DataType, _: &[u8], _: usize) -> Result<(), AdapterError> {
        Ok(())
    }

    fn on_aggregate(&mut self, _: DataType, _: AggregateLen, _: usize) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Materializes a single simple frame into `T`.
#[derive(Debug)]
pub struct Scalar<T: FromSimple> {
    value: Option<T>,
}

impl<T: FromSimple> Scalar<T> {
    pub fn new() -> Scalar<T> {
        Scalar { value: None }
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

impl<T: FromSimple> Default for Scalar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FromSimple> Adapter for Scalar<T> {
    fn on_simple(
        &mut self,
        kind: DataType,
        text: &[u8],
        _depth: usize,
    ) -> Result<(), AdapterError> {
        if kind == DataType::Invalid {
            return Ok(());
        }
        self.value = Some(T::from_simple(kind, text)?);
        Ok(())
    }

    fn on_aggregate(&mut self, _: DataType, _: AggregateLen, _: usize) -> Result<(), AdapterError> {
        Err(AdapterError::ExpectsSimpleType)
    }
}

/// Checks the header of a sequence-shaped aggregate and reports the error
/// codes shared by [`Seq`] and [`SetOf`].
fn check_seq_header(kind: DataType, depth: usize) -> Result<(), AdapterError> {
    if depth > 0 {
        // Elements must be scalars.
        return Err(AdapterError::ExpectsSimpleType);
    }
    match kind {
        DataType::Array | DataType::Set | DataType::Push => Ok(()),
        DataType::Map | DataType::Attribute => Err(AdapterError::ExpectsSetAggregate),
        _ => Err(AdapterError::ExpectsAggregate),
    }
}

fn check_simple_element(kind: DataType, text: &[u8], depth: usize) -> Result<(), AdapterError> {
    if depth == 0 {
        // A simple frame where the aggregate header should be.
        reject_special(kind, text)?;
        return Err(AdapterError::ExpectsAggregate);
    }
    Ok(())
}

/// Materializes an array/set/push of scalars into a `Vec<T>`.
#[derive(Debug)]
pub struct Seq<T: FromSimple> {
    items: Vec<T>,
}

impl<T: FromSimple> Seq<T> {
    pub fn new() -> Seq<T> {
        Seq { items: Vec::new() }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T: FromSimple> Default for Seq<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FromSimple> Adapter for Seq<T> {
    fn on_simple(
        &mut self,
        kind: DataType,
        text: &[u8],
        depth: usize,
    ) -> Result<(), AdapterError> {
        if kind == DataType::Invalid {
            return Ok(());
        }
        check_simple_element(kind, text, depth)?;
        self.items.push(T::from_simple(kind, text)?);
        Ok(())
    }

    fn on_aggregate(
        &mut self,
        kind: DataType,
        len: AggregateLen,
        depth: usize,
    ) -> Result<(), AdapterError> {
        check_seq_header(kind, depth)?;
        match len {
            AggregateLen::Count(count) => self.items.reserve(count),
            AggregateLen::Streamed => return Err(AdapterError::StreamedUnsupported),
        }
        Ok(())
    }
}

/// Materializes a set-shaped aggregate into a `HashSet<T>`, deduplicating
/// on insert.
#[derive(Debug)]
pub struct SetOf<T: FromSimple + Eq + Hash> {
    items: HashSet<T>,
}

impl<T: FromSimple + Eq + Hash> SetOf<T> {
    pub fn new() -> SetOf<T> {
        SetOf {
            items: HashSet::new(),
        }
    }

    pub fn items(&self) -> &HashSet<T> {
        &self.items
    }

    pub fn into_items(self) -> HashSet<T> {
        self.items
    }
}

impl<T: FromSimple + Eq + Hash> Default for SetOf<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FromSimple + Eq + Hash> Adapter for SetOf<T> {
    fn on_simple(
        &mut self,
        kind: DataType,
        text: &[u8],
        depth: usize,
    ) -> Result<(), AdapterError> {
        if kind == DataType::Invalid {
            return Ok(());
        }
        check_simple_element(kind, text, depth)?;
        self.items.insert(T::from_simple(kind, text)?);
        Ok(())
    }

    fn on_aggregate(
        &mut self,
        kind: DataType,
        len: AggregateLen,
        depth: usize,
    ) -> Result<(), AdapterError> {
        check_seq_header(kind, depth)?;
        match len {
            AggregateLen::Count(count) => self.items.reserve(count),
            AggregateLen::Streamed => return Err(AdapterError::StreamedUnsupported),
        }
        Ok(())
    }
}

/// Materializes a map-like aggregate into a `HashMap<K, V>`, consuming
/// elements as alternating keys and values.
#[derive(Debug)]
pub struct Mapping<K: FromSimple + Eq + Hash, V: FromSimple> {
    entries: HashMap<K, V>,
    pending_key: Option<K>,
}

impl<K: FromSimple + Eq + Hash, V: FromSimple> Mapping<K, V> {
    pub fn new() -> Mapping<K, V> {
        Mapping {
            entries: HashMap::new(),
            pending_key: None,
        }
    }

    pub fn entries(&self) -> &HashMap<K, V> {
        &self.entries
    }

    pub fn into_entries(self) -> HashMap<K, V> {
        self.entries
    }
}

impl<K: FromSimple + Eq + Hash, V: FromSimple> Default for Mapping<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: FromSimple + Eq + Hash, V: FromSimple> Adapter for Mapping<K, V> {
    fn on_simple(
        &mut self,
        kind: DataType,
        text: &[u8],
        depth: usize,
    ) -> Result<(), AdapterError> {
        if kind == DataType::Invalid {
            return Ok(());
        }
        check_simple_element(kind, text, depth)?;
        match self.pending_key.take() {
            None => {
                self.pending_key = Some(K::from_simple(kind, text)?);
            }
            Some(key) => {
                self.entries.insert(key, V::from_simple(kind, text)?);
            }
        }
        Ok(())
    }

    fn on_aggregate(
        &mut self,
        kind: DataType,
        len: AggregateLen,
        depth: usize,
    ) -> Result<(), AdapterError> {
        if depth > 0 {
            return Err(AdapterError::ExpectsSimpleType);
        }
        match kind {
            DataType::Map | DataType::Attribute => {}
            DataType::Array | DataType::Set | DataType::Push => {
                return Err(AdapterError::ExpectsMapLikeAggregate)
            }
            _ => return Err(AdapterError::ExpectsAggregate),
        }
        match len {
            AggregateLen::Count(count) => self.entries.reserve(count),
            AggregateLen::Streamed => return Err(AdapterError::StreamedUnsupported),
        }
        Ok(())
    }
}

/// Forwards to the inner adapter unless the value is a top-level null, in
/// which case the result is absent and the frame is swallowed.
#[derive(Debug)]
pub struct Opt<A: Adapter> {
    inner: A,
    absent: bool,
}

impl<A: Adapter> Opt<A> {
    pub fn new(inner: A) -> Opt<A> {
        Opt {
            inner,
            absent: false,
        }
    }

    /// `None` when the server answered with a null.
    pub fn into_option(self) -> Option<A> {
        if self.absent {
            None
        } else {
            Some(self.inner)
        }
    }
}

impl<A: Adapter> Adapter for Opt<A> {
    fn on_simple(
        &mut self,
        kind: DataType,
        text: &[u8],
        depth: usize,
    ) -> Result<(), AdapterError> {
        if kind == DataType::Null && depth == 0 {
            self.absent = true;
            return Ok(());
        }
        self.inner.on_simple(kind, text, depth)
    }

    fn on_aggregate(
        &mut self,
        kind: DataType,
        len: AggregateLen,
        depth: usize,
    ) -> Result<(), AdapterError> {
        self.inner.on_aggregate(kind, len, depth)
    }

    fn on_end(&mut self) {
        self.inner.on_end();
    }
}

/// Tracks completion of one element subtree so tuple adapters know when to
/// advance a slot. Mirrors the parser's unwind rule: counted aggregates
/// complete when their declared frames arrive, streamed ones on their end
/// sentinel.
#[derive(Debug, Default)]
struct TreeCounter {
    stack: Vec<Option<usize>>,
}

impl TreeCounter {
    fn on_aggregate(&mut self, frames: Option<usize>) -> bool {
        match frames {
            Some(0) => self.leaf(),
            other => {
                self.stack.push(other);
                false
            }
        }
    }

    fn on_leaf(&mut self) -> bool {
        self.leaf()
    }

    fn on_stream_end(&mut self) -> bool {
        self.stack.pop();
        self.leaf()
    }

    fn leaf(&mut self) -> bool {
        loop {
            match self.stack.last_mut() {
                None => return true,
                Some(None) => return false,
                Some(Some(frames)) => {
                    *frames -= 1;
                    if *frames == 0 {
                        self.stack.pop();
                        continue;
                    }
                    return false;
                }
            }
        }
    }
}

fn frames_of(kind: DataType, len: AggregateLen) -> Option<usize> {
    match len {
        AggregateLen::Count(count) => Some(count * kind.multiplicity()),
        AggregateLen::Streamed => None,
    }
}

/// Routes the i-th top-level response of a pipelined request to the i-th
/// inner adapter. The index advances only when a top-level value completes,
/// never mid-aggregate.
#[derive(Debug)]
pub struct Pipeline<T> {
    slots: T,
    index: usize,
}

impl<T> Pipeline<T> {
    pub fn new(slots: T) -> Pipeline<T> {
        Pipeline { slots, index: 0 }
    }

    pub fn into_inner(self) -> T {
        self.slots
    }
}

/// Consumes an `EXEC` reply: the outer array header is checked against the
/// tuple arity, then each element subtree is routed to the next slot with
/// depths shifted by one, so every inner adapter sees its value as if it
/// were a top-level response.
///
/// A null reply (transaction aborted by the server) leaves the slots
/// untouched and marks the result absent.
#[derive(Debug)]
pub struct Transaction<T> {
    slots: T,
    index: usize,
    absent: bool,
    tracker: TreeCounter,
}

impl<T> Transaction<T> {
    pub fn new(slots: T) -> Transaction<T> {
        Transaction {
            slots,
            index: 0,
            absent: false,
            tracker: TreeCounter::default(),
        }
    }

    /// True when the server aborted the transaction and replied null.
    pub fn is_absent(&self) -> bool {
        self.absent
    }

    pub fn into_inner(self) -> T {
        self.slots
    }
}

macro_rules! impl_tuple_adapters {
    ($len:expr => $($name:ident : $idx:tt),+) => {
        impl<$($name: Adapter),+> Adapter for Pipeline<($($name,)+)> {
            fn on_simple(
                &mut self,
                kind: DataType,
                text: &[u8],
                depth: usize,
            ) -> Result<(), AdapterError> {
                match self.index {
                    $($idx => self.slots.$idx.on_simple(kind, text, depth),)+
                    actual => Err(AdapterError::IncompatibleSize {
                        expected: $len,
                        actual: actual + 1,
                    }),
                }
            }

            fn on_aggregate(
                &mut self,
                kind: DataType,
                len: AggregateLen,
                depth: usize,
            ) -> Result<(), AdapterError> {
                match self.index {
                    $($idx => self.slots.$idx.on_aggregate(kind, len, depth),)+
                    actual => Err(AdapterError::IncompatibleSize {
                        expected: $len,
                        actual: actual + 1,
                    }),
                }
            }

            fn on_end(&mut self) {
                match self.index {
                    $($idx => self.slots.$idx.on_end(),)+
                    _ => {}
                }
                self.index += 1;
            }
        }

        impl<$($name: Adapter),+> Adapter for Transaction<($($name,)+)> {
            fn on_simple(
                &mut self,
                kind: DataType,
                text: &[u8],
                depth: usize,
            ) -> Result<(), AdapterError> {
                if depth == 0 {
                    if kind == DataType::Null {
                        self.absent = true;
                        return Ok(());
                    }
                    reject_special(kind, text)?;
                    return Err(AdapterError::ExpectsAggregate);
                }

                let depth = depth - 1;
                match self.index {
                    $($idx => self.slots.$idx.on_simple(kind, text, depth)?,)+
                    actual => {
                        return Err(AdapterError::IncompatibleSize {
                            expected: $len,
                            actual: actual + 1,
                        })
                    }
                }

                let element_done = match kind {
                    DataType::StreamedStringPart => false,
                    DataType::Invalid => self.tracker.on_stream_end(),
                    _ => self.tracker.on_leaf(),
                };
                if element_done {
                    match self.index {
                        $($idx => self.slots.$idx.on_end(),)+
                        _ => {}
                    }
                    self.index += 1;
                }
                Ok(())
            }

            fn on_aggregate(
                &mut self,
                kind: DataType,
                len: AggregateLen,
                depth: usize,
            ) -> Result<(), AdapterError> {
                if depth == 0 {
                    if !kind.is_aggregate() {
                        return Err(AdapterError::ExpectsAggregate);
                    }
                    return match len {
                        AggregateLen::Count(count) if count == $len => Ok(()),
                        AggregateLen::Count(count) => Err(AdapterError::IncompatibleSize {
                            expected: $len,
                            actual: count,
                        }),
                        AggregateLen::Streamed => Err(AdapterError::StreamedUnsupported),
                    };
                }

                let shifted = depth - 1;
                match self.index {
                    $($idx => self.slots.$idx.on_aggregate(kind, len, shifted)?,)+
                    actual => {
                        return Err(AdapterError::IncompatibleSize {
                            expected: $len,
                            actual: actual + 1,
                        })
                    }
                }

                if self.tracker.on_aggregate(frames_of(kind, len)) {
                    match self.index {
                        $($idx => self.slots.$idx.on_end(),)+
                        _ => {}
                    }
                    self.index += 1;
                }
                Ok(())
            }
        }
    };
}

impl_tuple_adapters!(1 => A: 0);
impl_tuple_adapters!(2 => A: 0, B: 1);
impl_tuple_adapters!(3 => A: 0, B: 1, C: 2);
impl_tuple_adapters!(4 => A: 0, B: 1, C: 2, D: 3);
impl_tuple_adapters!(5 => A: 0, B: 1, C: 2, D: 3, E: 4);
impl_tuple_adapters!(6 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_tuple_adapters!(7 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_tuple_adapters!(8 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// Builds a [`Frame`] tree out of the node stream, accepting every RESP3
/// type. Server error frames become `Frame::Error` values instead of
/// failing the response.
#[derive(Debug, Default)]
pub struct Collect {
    root: Option<Frame>,
    stack: Vec<Builder>,
}

#[derive(Debug)]
struct Builder {
    kind: DataType,
    /// Child frames left; `None` for streamed aggregates.
    remaining: Option<usize>,
    children: Vec<Frame>,
    /// Chunk accumulator for streamed strings.
    text: Vec<u8>,
}

impl Collect {
    pub fn new() -> Collect {
        Collect::default()
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.root.as_ref()
    }

    pub fn into_frame(self) -> Option<Frame> {
        self.root
    }

    fn attach(&mut self, mut frame: Frame) -> Result<(), AdapterError> {
        loop {
            match self.stack.pop() {
                None => {
                    self.root = Some(frame);
                    return Ok(());
                }
                Some(mut builder) => {
                    builder.children.push(frame);
                    match &mut builder.remaining {
                        None => {
                            self.stack.push(builder);
                            return Ok(());
                        }
                        Some(remaining) => {
                            *remaining -= 1;
                            if *remaining > 0 {
                                self.stack.push(builder);
                                return Ok(());
                            }
                        }
                    }
                    frame = finish(builder)?;
                }
            }
        }
    }

    fn close_stream(&mut self) -> Result<(), AdapterError> {
        let builder = self.stack.pop().ok_or(AdapterError::Unexpected)?;
        let frame = finish(builder)?;
        self.attach(frame)
    }
}

fn finish(builder: Builder) -> Result<Frame, AdapterError> {
    match builder.kind {
        DataType::Array => Ok(Frame::Array(builder.children)),
        DataType::Set => Ok(Frame::Set(builder.children)),
        DataType::Push => Ok(Frame::Push(builder.children)),
        DataType::Map | DataType::Attribute => {
            if builder.children.len() % 2 != 0 {
                return Err(AdapterError::Conversion(
                    "odd number of map elements".to_string(),
                ));
            }
            let mut entries = Vec::with_capacity(builder.children.len() / 2);
            let mut children = builder.children.into_iter();
            while let (Some(key), Some(value)) = (children.next(), children.next()) {
                entries.push((key, value));
            }
            Ok(Frame::Map(entries))
        }
        DataType::BulkString => Ok(Frame::Bulk(Bytes::from(builder.text))),
        DataType::VerbatimString => utf8(strip_verbatim(&builder.text)).map(Frame::Verbatim),
        DataType::BulkError => Ok(Frame::Error(lossy(&builder.text))),
        _ => Err(AdapterError::Unexpected),
    }
}

impl Adapter for Collect {
    fn on_simple(
        &mut self,
        kind: DataType,
        text: &[u8],
        _depth: usize,
    ) -> Result<(), AdapterError> {
        let leaf = match kind {
            DataType::SimpleString => Frame::Simple(utf8(text)?),
            DataType::SimpleError => Frame::Error(lossy(text)),
            DataType::Integer => Frame::Integer(i64::from_simple(kind, text)?),
            DataType::Double => Frame::Double(
                std::str::from_utf8(text)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| AdapterError::Conversion(lossy(text)))?,
            ),
            DataType::Boolean => Frame::Boolean(text == b"t"),
            DataType::BigNumber => Frame::BigNumber(utf8(text)?),
            DataType::BulkString => Frame::Bulk(Bytes::copy_from_slice(text)),
            DataType::BulkError => Frame::Error(lossy(text)),
            DataType::VerbatimString => Frame::Verbatim(utf8(strip_verbatim(text))?),
            DataType::Null => Frame::Null,
            DataType::StreamedStringPart => {
                match self.stack.last_mut() {
                    Some(builder) if builder.kind.is_blob() => {
                        builder.text.extend_from_slice(text)
                    }
                    _ => return Err(AdapterError::Unexpected),
                }
                return Ok(());
            }
            DataType::Invalid => return self.close_stream(),
            _ => return Err(AdapterError::Unexpected),
        };
        self.attach(leaf)
    }

    fn on_aggregate(
        &mut self,
        kind: DataType,
        len: AggregateLen,
        _depth: usize,
    ) -> Result<(), AdapterError> {
        let remaining = frames_of(kind, len);
        if remaining == Some(0) {
            let empty = Builder {
                kind,
                remaining: None,
                children: Vec::new(),
                text: Vec::new(),
            };
            return self.attach(finish(empty)?);
        }
        self.stack.push(Builder {
            kind,
            remaining,
            children: match remaining {
                Some(frames) => Vec::with_capacity(frames),
                None => Vec::new(),
            },
            text: Vec::new(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    /// Drives one top-level value through the parser into the adapter.
    fn feed<A: Adapter>(input: &[u8], adapter: &mut A) -> Option<AdapterError> {
        let mut parser = Parser::new();
        let consumed = parser.advance(input, adapter).unwrap();
        assert!(parser.done());
        assert_eq!(consumed, input.len());
        parser.take_sink_error()
    }

    #[test]
    fn scalar_string_from_simple_and_bulk() {
        let mut adapter = Scalar::<String>::new();
        assert_eq!(feed(b"+Hello\r\n", &mut adapter), None);
        assert_eq!(adapter.value(), Some(&"Hello".to_string()));

        let mut adapter = Scalar::<String>::new();
        assert_eq!(feed(b"$5\r\nworld\r\n", &mut adapter), None);
        assert_eq!(adapter.into_value(), Some("world".to_string()));
    }

    #[test]
    fn scalar_string_strips_verbatim_prefix() {
        let mut adapter = Scalar::<String>::new();
        assert_eq!(feed(b"=15\r\ntxt:Some string\r\n", &mut adapter), None);
        assert_eq!(adapter.into_value(), Some("Some string".to_string()));
    }

    #[test]
    fn scalar_numbers_and_booleans() {
        let mut adapter = Scalar::<i64>::new();
        assert_eq!(feed(b":-42\r\n", &mut adapter), None);
        assert_eq!(adapter.into_value(), Some(-42));

        let mut adapter = Scalar::<f64>::new();
        assert_eq!(feed(b",3.25\r\n", &mut adapter), None);
        assert_eq!(adapter.into_value(), Some(3.25));

        let mut adapter = Scalar::<bool>::new();
        assert_eq!(feed(b"#t\r\n", &mut adapter), None);
        assert_eq!(adapter.into_value(), Some(true));

        let mut adapter = Scalar::<i128>::new();
        assert_eq!(
            feed(b"(123456789012345678901234567890\r\n", &mut adapter),
            None
        );
        assert_eq!(adapter.into_value(), Some(123456789012345678901234567890i128));
    }

    #[test]
    fn scalar_rejects_aggregates() {
        let mut adapter = Scalar::<String>::new();
        assert_eq!(
            feed(b"*1\r\n+x\r\n", &mut adapter),
            Some(AdapterError::ExpectsSimpleType)
        );
    }

    #[test]
    fn scalar_rejects_null_without_mutation() {
        let mut adapter = Scalar::<String>::new();
        assert_eq!(feed(b"_\r\n", &mut adapter), Some(AdapterError::Null));
        assert_eq!(adapter.value(), None);
    }

    #[test]
    fn optional_from_simple_accepts_null() {
        let mut adapter = Scalar::<Option<String>>::new();
        assert_eq!(feed(b"_\r\n", &mut adapter), None);
        assert_eq!(adapter.into_value(), Some(None));

        let mut adapter = Scalar::<Option<String>>::new();
        assert_eq!(feed(b"+some\r\n", &mut adapter), None);
        assert_eq!(adapter.into_value(), Some(Some("some".to_string())));
    }

    #[test]
    fn server_error_frames_become_error_codes() {
        let mut adapter = Scalar::<String>::new();
        assert_eq!(
            feed(b"-ERR wrong type\r\n", &mut adapter),
            Some(AdapterError::SimpleError("ERR wrong type".to_string()))
        );

        let mut adapter = Scalar::<String>::new();
        assert_eq!(
            feed(b"!9\r\nSYNTAX no\r\n", &mut adapter),
            Some(AdapterError::BlobError("SYNTAX no".to_string()))
        );
    }

    #[test]
    fn seq_collects_scalars() {
        let mut adapter = Seq::<i64>::new();
        assert_eq!(feed(b"*3\r\n:1\r\n:2\r\n:3\r\n", &mut adapter), None);
        assert_eq!(adapter.into_items(), vec![1, 2, 3]);
    }

    #[test]
    fn seq_accepts_set_and_push_headers() {
        let mut adapter = Seq::<String>::new();
        assert_eq!(feed(b"~2\r\n+a\r\n+b\r\n", &mut adapter), None);
        assert_eq!(adapter.into_items(), vec!["a", "b"]);
    }

    #[test]
    fn seq_of_optionals_keeps_null_elements() {
        let mut adapter = Seq::<Option<String>>::new();
        assert_eq!(feed(b"*3\r\n+a\r\n_\r\n+c\r\n", &mut adapter), None);
        assert_eq!(
            adapter.into_items(),
            vec![Some("a".to_string()), None, Some("c".to_string())]
        );
    }

    #[test]
    fn seq_rejects_simple_frame() {
        let mut adapter = Seq::<String>::new();
        assert_eq!(
            feed(b"+oops\r\n", &mut adapter),
            Some(AdapterError::ExpectsAggregate)
        );
    }

    #[test]
    fn seq_rejects_map_header() {
        let mut adapter = Seq::<String>::new();
        assert_eq!(
            feed(b"%1\r\n+k\r\n+v\r\n", &mut adapter),
            Some(AdapterError::ExpectsSetAggregate)
        );
    }

    #[test]
    fn seq_rejects_null_element() {
        let mut adapter = Seq::<String>::new();
        assert_eq!(
            feed(b"*2\r\n+a\r\n_\r\n", &mut adapter),
            Some(AdapterError::Null)
        );
    }

    #[test]
    fn empty_aggregate_yields_empty_container() {
        let mut adapter = Seq::<i64>::new();
        assert_eq!(feed(b"*0\r\n", &mut adapter), None);
        assert!(adapter.into_items().is_empty());
    }

    #[test]
    fn mapping_alternates_keys_and_values() {
        let mut adapter = Mapping::<String, i64>::new();
        assert_eq!(feed(b"%2\r\n+one\r\n:1\r\n+two\r\n:2\r\n", &mut adapter), None);

        let entries = adapter.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["one"], 1);
        assert_eq!(entries["two"], 2);
    }

    #[test]
    fn mapping_rejects_sequence_header() {
        let mut adapter = Mapping::<String, String>::new();
        assert_eq!(
            feed(b"*2\r\n+a\r\n+b\r\n", &mut adapter),
            Some(AdapterError::ExpectsMapLikeAggregate)
        );
    }

    #[test]
    fn seq_rejects_streamed_header() {
        let mut adapter = Seq::<String>::new();
        assert_eq!(
            feed(b"*-1\r\n+a\r\n.\r\n", &mut adapter),
            Some(AdapterError::StreamedUnsupported)
        );
    }

    #[test]
    fn set_of_rejects_streamed_header() {
        let mut adapter = SetOf::<String>::new();
        assert_eq!(
            feed(b"~-1\r\n+a\r\n.\r\n", &mut adapter),
            Some(AdapterError::StreamedUnsupported)
        );
    }

    #[test]
    fn mapping_rejects_streamed_header() {
        let mut adapter = Mapping::<String, String>::new();
        assert_eq!(
            feed(b"%-1\r\n+k\r\n+v\r\n.\r\n", &mut adapter),
            Some(AdapterError::StreamedUnsupported)
        );
    }

    #[test]
    fn set_of_deduplicates() {
        let mut adapter = SetOf::<String>::new();
        assert_eq!(feed(b"~3\r\n+a\r\n+b\r\n+a\r\n", &mut adapter), None);
        assert_eq!(adapter.into_items().len(), 2);
    }

    #[test]
    fn opt_absent_on_null() {
        let mut adapter = Opt::new(Seq::<String>::new());
        assert_eq!(feed(b"_\r\n", &mut adapter), None);
        assert!(adapter.into_option().is_none());

        let mut adapter = Opt::new(Seq::<String>::new());
        assert_eq!(feed(b"*1\r\n+a\r\n", &mut adapter), None);
        let inner = adapter.into_option().unwrap();
        assert_eq!(inner.into_items(), vec!["a"]);
    }

    #[test]
    fn pipeline_routes_consecutive_frames() {
        let mut adapter = Pipeline::new((Scalar::<String>::new(), Scalar::<i64>::new()));

        let mut parser = Parser::new();
        parser.advance(b"+pong\r\n", &mut adapter).unwrap();
        assert!(parser.done());

        let mut parser = Parser::new();
        parser.advance(b":7\r\n", &mut adapter).unwrap();
        assert!(parser.done());

        let (first, second) = adapter.into_inner();
        assert_eq!(first.into_value(), Some("pong".to_string()));
        assert_eq!(second.into_value(), Some(7));
    }

    #[test]
    fn pipeline_rejects_extra_frames() {
        let mut adapter = Pipeline::new((Scalar::<String>::new(),));

        let mut parser = Parser::new();
        parser.advance(b"+one\r\n", &mut adapter).unwrap();

        let mut parser = Parser::new();
        parser.advance(b"+two\r\n", &mut adapter).unwrap();
        assert_eq!(
            parser.take_sink_error(),
            Some(AdapterError::IncompatibleSize {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn transaction_unwraps_exec_array() {
        let mut adapter = Transaction::new((Seq::<i64>::new(), Mapping::<String, String>::new()));
        let input = b"*2\r\n*2\r\n:1\r\n:2\r\n%1\r\n+k\r\n$1\r\nv\r\n";
        assert_eq!(feed(input, &mut adapter), None);
        assert!(!adapter.is_absent());

        let (seq, map) = adapter.into_inner();
        assert_eq!(seq.into_items(), vec![1, 2]);
        assert_eq!(map.into_entries()["k"], "v");
    }

    #[test]
    fn transaction_checks_arity() {
        let mut adapter = Transaction::new((Scalar::<i64>::new(), Scalar::<i64>::new()));
        assert_eq!(
            feed(b"*3\r\n:1\r\n:2\r\n:3\r\n", &mut adapter),
            Some(AdapterError::IncompatibleSize {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn transaction_null_reply_is_absent() {
        let mut adapter = Transaction::new((Scalar::<i64>::new(),));
        assert_eq!(feed(b"_\r\n", &mut adapter), None);
        assert!(adapter.is_absent());
        let (slot,) = adapter.into_inner();
        assert_eq!(slot.into_value(), None);
    }

    #[test]
    fn transaction_routes_nested_elements() {
        // Element subtrees deeper than one level still advance correctly.
        let mut adapter = Transaction::new((Collect::new(), Scalar::<String>::new()));
        let input = b"*2\r\n*2\r\n*1\r\n:1\r\n:2\r\n+done\r\n";
        assert_eq!(feed(input, &mut adapter), None);

        let (tree, tail) = adapter.into_inner();
        assert_eq!(
            tree.into_frame(),
            Some(Frame::Array(vec![
                Frame::Array(vec![Frame::Integer(1)]),
                Frame::Integer(2),
            ]))
        );
        assert_eq!(tail.into_value(), Some("done".to_string()));
    }

    #[test]
    fn collect_builds_mixed_tree() {
        let mut adapter = Collect::new();
        let input =
            b"*4\r\n%1\r\n+k\r\n:1\r\n~2\r\n+a\r\n+b\r\n-ERR boom\r\n,1.5\r\n";
        assert_eq!(feed(input, &mut adapter), None);

        assert_eq!(
            adapter.into_frame(),
            Some(Frame::Array(vec![
                Frame::Map(vec![(Frame::Simple("k".to_string()), Frame::Integer(1))]),
                Frame::Set(vec![
                    Frame::Simple("a".to_string()),
                    Frame::Simple("b".to_string()),
                ]),
                Frame::Error("ERR boom".to_string()),
                Frame::Double(1.5),
            ]))
        );
    }

    #[test]
    fn collect_reassembles_streamed_string() {
        let mut adapter = Collect::new();
        assert_eq!(
            feed(b"$?\r\n;4\r\nHell\r\n;1\r\no\r\n;0\r\n", &mut adapter),
            None
        );
        assert_eq!(
            adapter.into_frame(),
            Some(Frame::Bulk(Bytes::from("Hello")))
        );
    }

    #[test]
    fn collect_finishes_streamed_aggregate() {
        let mut adapter = Collect::new();
        assert_eq!(feed(b"*-1\r\n:1\r\n:2\r\n.\r\n", &mut adapter), None);
        assert_eq!(
            adapter.into_frame(),
            Some(Frame::Array(vec![Frame::Integer(1), Frame::Integer(2)]))
        );
    }

    #[test]
    fn ignore_accepts_anything() {
        let mut adapter = Ignore;
        assert_eq!(feed(b"*2\r\n-ERR x\r\n_\r\n", &mut adapter), None);
    }
}
