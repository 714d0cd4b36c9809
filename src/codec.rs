use bytes::Bytes;

use crate::frame::CRLF;

/// Appends an aggregate header `*<len>\r\n` to the buffer.
///
/// Outbound traffic is always an array of bulk strings, so the array tag is
/// the only header the client ever writes.
pub fn append_header(buf: &mut Vec<u8>, len: usize) {
    buf.push(b'*');
    buf.extend_from_slice(len.to_string().as_bytes());
    buf.extend_from_slice(CRLF);
}

/// Appends one bulk string `$<len>\r\n<data>\r\n` to the buffer.
pub fn append_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(b'$');
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(data);
    buf.extend_from_slice(CRLF);
}

/// A value that frames itself as exactly one bulk string.
pub trait ToArg {
    fn write_arg(&self, buf: &mut Vec<u8>);
}

impl ToArg for str {
    fn write_arg(&self, buf: &mut Vec<u8>) {
        append_bulk(buf, self.as_bytes());
    }
}

impl ToArg for String {
    fn write_arg(&self, buf: &mut Vec<u8>) {
        append_bulk(buf, self.as_bytes());
    }
}

impl ToArg for Bytes {
    fn write_arg(&self, buf: &mut Vec<u8>) {
        append_bulk(buf, self);
    }
}

impl ToArg for Vec<u8> {
    fn write_arg(&self, buf: &mut Vec<u8>) {
        append_bulk(buf, self);
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn write_arg(&self, buf: &mut Vec<u8>) {
        (**self).write_arg(buf);
    }
}

macro_rules! to_arg_via_to_string {
    ($($t:ty),+) => {
        $(
            impl ToArg for $t {
                fn write_arg(&self, buf: &mut Vec<u8>) {
                    append_bulk(buf, self.to_string().as_bytes());
                }
            }
        )+
    };
}

to_arg_via_to_string!(i32, i64, u32, u64, usize, f64);

/// The argument list of one command: knows how many bulks it contributes
/// and writes them in order.
pub trait CommandArgs {
    fn count(&self) -> usize;
    fn write(&self, buf: &mut Vec<u8>);
}

impl CommandArgs for () {
    fn count(&self) -> usize {
        0
    }

    fn write(&self, _buf: &mut Vec<u8>) {}
}

macro_rules! command_args_for_scalar {
    ($($t:ty),+) => {
        $(
            impl CommandArgs for $t {
                fn count(&self) -> usize {
                    1
                }

                fn write(&self, buf: &mut Vec<u8>) {
                    self.write_arg(buf);
                }
            }
        )+
    };
}

command_args_for_scalar!(&str, String, Bytes, i32, i64, u32, u64, usize, f64);

macro_rules! command_args_for_tuple {
    ($($name:ident : $idx:tt),+ => $len:expr) => {
        impl<$($name: ToArg),+> CommandArgs for ($($name,)+) {
            fn count(&self) -> usize {
                $len
            }

            fn write(&self, buf: &mut Vec<u8>) {
                $(self.$idx.write_arg(buf);)+
            }
        }
    };
}

command_args_for_tuple!(A: 0 => 1);
command_args_for_tuple!(A: 0, B: 1 => 2);
command_args_for_tuple!(A: 0, B: 1, C: 2 => 3);
command_args_for_tuple!(A: 0, B: 1, C: 2, D: 3 => 4);
command_args_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4 => 5);
command_args_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5 => 6);

impl<T: ToArg> CommandArgs for &[T] {
    fn count(&self) -> usize {
        self.len()
    }

    fn write(&self, buf: &mut Vec<u8>) {
        for item in *self {
            item.write_arg(buf);
        }
    }
}

impl<T: ToArg> CommandArgs for Vec<T> {
    fn count(&self) -> usize {
        self.len()
    }

    fn write(&self, buf: &mut Vec<u8>) {
        for item in self {
            item.write_arg(buf);
        }
    }
}

/// Frames one command as `*<1 + args>\r\n` followed by the name and each
/// argument as a bulk string.
pub fn append_command<A: CommandArgs>(buf: &mut Vec<u8>, name: &str, args: &A) {
    append_header(buf, 1 + args.count());
    append_bulk(buf, name.as_bytes());
    args.write(buf);
}

/// Frames one command whose arguments are an optional key followed by a
/// range of single-bulk elements, e.g. `RPUSH key v1 v2 v3`.
pub fn append_command_range<K, I>(buf: &mut Vec<u8>, name: &str, key: Option<&K>, items: I)
where
    K: ToArg + ?Sized,
    I: IntoIterator,
    I::Item: ToArg,
    I::IntoIter: ExactSizeIterator,
{
    let items = items.into_iter();
    let key_len = usize::from(key.is_some());
    append_header(buf, 1 + key_len + items.len());
    append_bulk(buf, name.as_bytes());
    if let Some(key) = key {
        key.write_arg(buf);
    }
    for item in items {
        item.write_arg(buf);
    }
}

/// Frames one command whose arguments are an optional key followed by a
/// range of pairs, each contributing two bulks in the caller-given order,
/// e.g. `HSET key f1 v1 f2 v2` or `ZADD key score member`.
pub fn append_command_range_pairs<K, I, A, B>(
    buf: &mut Vec<u8>,
    name: &str,
    key: Option<&K>,
    items: I,
) where
    K: ToArg + ?Sized,
    I: IntoIterator<Item = (A, B)>,
    I::IntoIter: ExactSizeIterator,
    A: ToArg,
    B: ToArg,
{
    let items = items.into_iter();
    let key_len = usize::from(key.is_some());
    append_header(buf, 1 + key_len + 2 * items.len());
    append_bulk(buf, name.as_bytes());
    if let Some(key) = key {
        key.write_arg(buf);
    }
    for (first, second) in items {
        first.write_arg(buf);
        second.write_arg(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_command_without_args() {
        let mut buf = Vec::new();
        append_command(&mut buf, "PING", &());
        assert_eq!(&buf, b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn encodes_command_with_one_arg() {
        let mut buf = Vec::new();
        append_command(&mut buf, "PING", &"Hello");
        assert_eq!(&buf, b"*2\r\n$4\r\nPING\r\n$5\r\nHello\r\n");
    }

    #[test]
    fn encodes_command_with_mixed_args() {
        let mut buf = Vec::new();
        append_command(&mut buf, "SET", &("key", 42));
        assert_eq!(&buf, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$2\r\n42\r\n");
    }

    #[test]
    fn encodes_numeric_args_as_decimal_ascii() {
        let mut buf = Vec::new();
        append_command(&mut buf, "EXPIRE", &("key", 10u64));
        assert_eq!(&buf, b"*3\r\n$6\r\nEXPIRE\r\n$3\r\nkey\r\n$2\r\n10\r\n");
    }

    #[test]
    fn encodes_range_with_key() {
        let mut buf = Vec::new();
        append_command_range(&mut buf, "RPUSH", Some("list"), &[1, 2, 3]);
        assert_eq!(
            &buf,
            b"*5\r\n$5\r\nRPUSH\r\n$4\r\nlist\r\n$1\r\n1\r\n$1\r\n2\r\n$1\r\n3\r\n"
        );
    }

    #[test]
    fn encodes_range_without_key() {
        let mut buf = Vec::new();
        append_command_range::<str, _>(&mut buf, "SUBSCRIBE", None, &["a", "b"]);
        assert_eq!(&buf, b"*3\r\n$9\r\nSUBSCRIBE\r\n$1\r\na\r\n$1\r\nb\r\n");
    }

    #[test]
    fn encodes_pair_range_with_two_bulks_per_element() {
        let mut buf = Vec::new();
        append_command_range_pairs(&mut buf, "HSET", Some("hash"), vec![("f1", "v1"), ("f2", "v2")]);
        assert_eq!(
            &buf,
            b"*6\r\n$4\r\nHSET\r\n$4\r\nhash\r\n$2\r\nf1\r\n$2\r\nv1\r\n$2\r\nf2\r\n$2\r\nv2\r\n"
        );
    }

    #[test]
    fn encodes_empty_and_binary_bulk_args() {
        let mut buf = Vec::new();
        append_command(&mut buf, "SET", &("key", Bytes::from_static(b"a\r\nb")));
        assert_eq!(&buf, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$4\r\na\r\nb\r\n");

        let mut buf = Vec::new();
        append_command(&mut buf, "SET", &("key", ""));
        assert_eq!(&buf, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$0\r\n\r\n");
    }
}
