//! Reply encoding.
//!
//! Emits the exact wire bytes for the RESP-2 reply types the server uses.
//! All writers append to a `BytesMut` so a pipelined batch of replies
//! accumulates in one output buffer.

use bytes::BytesMut;

/// Append a simple string reply: `+<text>\r\n`.
///
/// RESP-2 simple strings are line-delimited; `text` should not contain CR
/// or LF. The bytes are emitted as-is.
pub fn simple_string(buf: &mut BytesMut, text: &[u8]) {
    buf.reserve(text.len() + 3);
    buf.extend_from_slice(b"+");
    buf.extend_from_slice(text);
    buf.extend_from_slice(b"\r\n");
}

/// Append an error reply: `-<text>\r\n`.
pub fn error(buf: &mut BytesMut, text: &str) {
    debug_assert!(!text.contains('\r') && !text.contains('\n'));
    buf.reserve(text.len() + 3);
    buf.extend_from_slice(b"-");
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// Append an integer reply: `:<decimal>\r\n`.
pub fn integer(buf: &mut BytesMut, value: i64) {
    let mut digits = itoa::Buffer::new();
    let formatted = digits.format(value);
    buf.reserve(formatted.len() + 3);
    buf.extend_from_slice(b":");
    buf.extend_from_slice(formatted.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// Append a non-null bulk string reply: `$<len>\r\n<bytes>\r\n`.
pub fn bulk_string(buf: &mut BytesMut, value: &[u8]) {
    let mut digits = itoa::Buffer::new();
    let len = digits.format(value.len());
    buf.reserve(1 + len.len() + 2 + value.len() + 2);
    buf.extend_from_slice(b"$");
    buf.extend_from_slice(len.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(value);
    buf.extend_from_slice(b"\r\n");
}

/// Append a null bulk string reply: `$-1\r\n`.
pub fn null_bulk(buf: &mut BytesMut) {
    buf.extend_from_slice(b"$-1\r\n");
}

/// Append a request: an array of bulk strings, one per argument.
///
/// This is the client side of the protocol; the server only uses it in
/// tests, but clients and benchmark tooling share the same encoding.
pub fn request(buf: &mut BytesMut, args: &[&[u8]]) {
    let mut digits = itoa::Buffer::new();
    let count = digits.format(args.len());
    buf.reserve(1 + count.len() + 2);
    buf.extend_from_slice(b"*");
    buf.extend_from_slice(count.as_bytes());
    buf.extend_from_slice(b"\r\n");
    for arg in args {
        bulk_string(buf, arg);
    }
}
