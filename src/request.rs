use std::collections::VecDeque;

use crate::codec::{self, CommandArgs, ToArg};
use crate::command::Command;

/// A pipeline of commands framed into one contiguous payload.
///
/// Commands are appended with the push helpers and the whole request is
/// written to the server as a single write. Alongside the payload the
/// request keeps the queue of command tags whose responses the connection
/// will have to match in FIFO order; commands answered by push frames
/// (the subscribe family) contribute no tag.
///
/// A request can be cleared and refilled, or submitted again once its
/// previous completion has been observed.
#[derive(Debug, Default, Clone)]
pub struct Request {
    payload: Vec<u8>,
    tags: VecDeque<Command>,
    commands: usize,
}

impl Request {
    pub fn new() -> Request {
        Request::default()
    }

    /// Appends one command frame.
    ///
    /// `args` is anything that knows how to frame itself as bulk strings:
    /// `()`, a single value, a tuple of values, or a slice.
    pub fn push<A: CommandArgs>(&mut self, cmd: Command, args: A) {
        codec::append_command(&mut self.payload, cmd.name(), &args);
        self.note(cmd);
    }

    /// Appends one command frame with a key and a range of elements, each
    /// contributing a single bulk, e.g. `RPUSH key v1 v2 v3`.
    pub fn push_range<K, I>(&mut self, cmd: Command, key: K, items: I)
    where
        K: ToArg,
        I: IntoIterator,
        I::Item: ToArg,
        I::IntoIter: ExactSizeIterator,
    {
        codec::append_command_range(&mut self.payload, cmd.name(), Some(&key), items);
        self.note(cmd);
    }

    /// Appends one command frame with a key and a range of pairs, each
    /// contributing two bulks in the caller-given order, e.g.
    /// `HSET key f1 v1 f2 v2`.
    pub fn push_range_pairs<K, I, A, B>(&mut self, cmd: Command, key: K, items: I)
    where
        K: ToArg,
        I: IntoIterator<Item = (A, B)>,
        I::IntoIter: ExactSizeIterator,
        A: ToArg,
        B: ToArg,
    {
        codec::append_command_range_pairs(&mut self.payload, cmd.name(), Some(&key), items);
        self.note(cmd);
    }

    fn note(&mut self, cmd: Command) {
        self.commands += 1;
        if !cmd.has_push_response() {
            self.tags.push_back(cmd);
        }
    }

    /// Resets the request so it can be refilled.
    pub fn clear(&mut self) {
        self.payload.clear();
        self.tags.clear();
        self.commands = 0;
    }

    /// Number of commands in the pipeline, including those answered by
    /// pushes.
    pub fn len(&self) -> usize {
        self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The framed wire bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Tags of the commands the server will answer with regular responses.
    pub fn tags(&self) -> &VecDeque<Command> {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_appends_one_frame_and_one_tag() {
        let mut req = Request::new();
        req.push(Command::Ping, "Hello");

        assert_eq!(req.payload(), b"*2\r\n$4\r\nPING\r\n$5\r\nHello\r\n");
        assert_eq!(req.tags().len(), 1);
        assert_eq!(req.len(), 1);
    }

    #[test]
    fn subscribe_contributes_no_tag() {
        let mut req = Request::new();
        req.push(Command::Subscribe, "channel");
        req.push(Command::Ping, ());

        assert_eq!(req.len(), 2);
        assert_eq!(req.tags().len(), 1);
        assert_eq!(req.tags().front(), Some(&Command::Ping));
    }

    #[test]
    fn push_range_flattens_elements_in_order() {
        let mut req = Request::new();
        req.push_range(Command::Rpush, "list", &[1, 2, 3]);

        assert_eq!(
            req.payload(),
            b"*5\r\n$5\r\nRPUSH\r\n$4\r\nlist\r\n$1\r\n1\r\n$1\r\n2\r\n$1\r\n3\r\n"
        );
        assert_eq!(req.tags().len(), 1);
    }

    #[test]
    fn push_range_pairs_emits_two_bulks_per_element() {
        let mut req = Request::new();
        req.push_range_pairs(Command::Zadd, "zset", vec![(1, "one"), (2, "two")]);

        assert_eq!(
            req.payload(),
            b"*6\r\n$4\r\nZADD\r\n$4\r\nzset\r\n$1\r\n1\r\n$3\r\none\r\n$1\r\n2\r\n$3\r\ntwo\r\n"
        );
    }

    #[test]
    fn clear_resets_for_reuse() {
        let mut req = Request::new();
        req.push(Command::Get, "key");
        req.clear();

        assert!(req.is_empty());
        assert_eq!(req.len(), 0);
        assert!(req.tags().is_empty());

        req.push(Command::Ping, ());
        assert_eq!(req.payload(), b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn pipelined_commands_share_one_payload() {
        let mut req = Request::new();
        req.push(Command::Multi, ());
        req.push(Command::Lrange, ("key", 0, -1));
        req.push(Command::Exec, ());

        assert_eq!(req.tags().len(), 3);
        let expected: Vec<u8> = [
            &b"*1\r\n$5\r\nMULTI\r\n"[..],
            &b"*4\r\n$6\r\nLRANGE\r\n$3\r\nkey\r\n$1\r\n0\r\n$2\r\n-1\r\n"[..],
            &b"*1\r\n$4\r\nEXEC\r\n"[..],
        ]
        .concat();
        assert_eq!(req.payload(), &expected[..]);
    }
}
