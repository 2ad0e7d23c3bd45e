//! Per-connection state.
//!
//! Each connection carries an input buffer of unparsed bytes and an output
//! buffer of unflushed replies. Commands are framed incrementally: a read
//! may deliver half a command or a dozen pipelined ones, and replies are
//! appended in arrival order so per-connection ordering holds.

use crate::execute;
use crate::metrics::PROTOCOL_ERRORS;
use blinkdb_cache::BlinkDb;
use bytes::{Buf, BytesMut};
use protocol_resp::{ParseError, ParseOptions, Request, encode};
use tracing::debug;

/// Per-connection buffers and lifecycle state.
pub struct Connection {
    read_buf: BytesMut,
    write_buf: BytesMut,
    write_pos: usize,
    closing: bool,
    options: ParseOptions,
}

impl Connection {
    /// Pending-output threshold above which command processing pauses.
    /// Processing resumes once the socket drains; the reactor stops
    /// reading from a connection that is this far behind.
    pub const MAX_PENDING_WRITE: usize = 256 * 1024;

    pub fn new(read_buffer_size: usize, options: ParseOptions) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(read_buffer_size),
            write_buf: BytesMut::with_capacity(4096),
            write_pos: 0,
            closing: false,
            options,
        }
    }

    /// Append received bytes to the input buffer.
    #[inline]
    pub fn append_recv_data(&mut self, data: &[u8]) {
        // Re-reserve when utilization is low so BytesMut can reclaim the
        // already-consumed prefix instead of growing without bound.
        let cap = self.read_buf.capacity();
        if cap > 0 && self.read_buf.len() * 2 < cap {
            self.read_buf.reserve(data.len());
        }
        self.read_buf.extend_from_slice(data);
    }

    #[inline]
    pub fn input_len(&self) -> usize {
        self.read_buf.len()
    }

    /// Frame and execute every complete command in the input buffer.
    ///
    /// Stops on incomplete input, on backpressure, and after QUIT. A
    /// malformed stream appends one protocol error reply and marks the
    /// connection closing.
    pub fn process(&mut self, db: &mut BlinkDb) {
        if self.write_pos >= self.write_buf.len() {
            self.write_buf.clear();
            self.write_pos = 0;
        }

        loop {
            if self.closing || self.read_buf.is_empty() {
                break;
            }
            if self.pending_write_len() > Self::MAX_PENDING_WRITE {
                break;
            }

            match Request::parse(&self.read_buf, &self.options) {
                Ok((request, consumed)) => {
                    let close = execute::execute(&request.args, db, &mut self.write_buf);
                    self.read_buf.advance(consumed);
                    if close {
                        // Pipelined commands after QUIT never ran and get
                        // no replies; the client asked to go away.
                        self.closing = true;
                    }
                }
                Err(ParseError::Incomplete) => break,
                Err(e) => {
                    debug!(error = %e, "malformed request");
                    self.fail_protocol();
                    break;
                }
            }
        }
    }

    /// Reject the stream: emit one protocol error reply, discard unparsed
    /// input, and mark the connection closing.
    pub fn fail_protocol(&mut self) {
        PROTOCOL_ERRORS.increment();
        encode::error(&mut self.write_buf, "ERR protocol error");
        self.read_buf.clear();
        self.closing = true;
    }

    /// Whether the reactor should keep reading from this connection.
    #[inline]
    pub fn should_read(&self) -> bool {
        !self.closing && self.pending_write_len() <= Self::MAX_PENDING_WRITE
    }

    #[inline]
    pub fn pending_write_len(&self) -> usize {
        self.write_buf.len().saturating_sub(self.write_pos)
    }

    #[inline]
    pub fn has_pending_write(&self) -> bool {
        self.write_pos < self.write_buf.len()
    }

    #[inline]
    pub fn pending_write_data(&self) -> &[u8] {
        &self.write_buf[self.write_pos..]
    }

    #[inline]
    pub fn advance_write(&mut self, n: usize) {
        self.write_pos += n;
    }

    #[inline]
    pub fn closing(&self) -> bool {
        self.closing
    }

    #[inline]
    pub fn set_closing(&mut self) {
        self.closing = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn db(dir: &std::path::Path) -> BlinkDb {
        BlinkDb::builder()
            .hot_capacity(4)
            .warm_capacity(4)
            .data_dir(dir)
            .build()
            .unwrap()
    }

    fn conn() -> Connection {
        Connection::new(1024, ParseOptions::default())
    }

    #[test]
    fn test_partial_request_waits_for_completion() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let mut conn = conn();

        // SET split mid-command: no reply until the full frame arrives.
        conn.append_recv_data(b"*3\r\n$3\r\nSET");
        conn.process(&mut db);
        assert!(!conn.has_pending_write());

        conn.append_recv_data(b"\r\n$1\r\nk\r\n$1\r\nv\r\n");
        conn.process(&mut db);
        assert_eq!(conn.pending_write_data(), b"+OK\r\n");
    }

    #[test]
    fn test_pipelined_requests_reply_in_order() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let mut conn = conn();

        conn.append_recv_data(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n");
        conn.process(&mut db);
        assert_eq!(conn.pending_write_data(), b"+PONG\r\n+PONG\r\n");
    }

    #[test]
    fn test_complete_plus_partial() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let mut conn = conn();

        conn.append_recv_data(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n*2\r\n$3\r\nGET\r\n$3\r\nba");
        conn.process(&mut db);
        assert_eq!(conn.pending_write_data(), b"$-1\r\n");

        conn.append_recv_data(b"r\r\n");
        conn.process(&mut db);
        assert_eq!(conn.pending_write_data(), b"$-1\r\n$-1\r\n");
    }

    #[test]
    fn test_partial_write_advance() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let mut conn = conn();

        conn.append_recv_data(b"*1\r\n$4\r\nPING\r\n");
        conn.process(&mut db);
        let pending = conn.pending_write_data().len();

        conn.advance_write(2);
        assert_eq!(conn.pending_write_data(), b"ONG\r\n");
        conn.advance_write(pending - 2);
        assert!(!conn.has_pending_write());
    }

    #[test]
    fn test_malformed_input_closes() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let mut conn = conn();

        conn.append_recv_data(b"GET foo\r\n");
        conn.process(&mut db);
        assert_eq!(conn.pending_write_data(), b"-ERR protocol error\r\n");
        assert!(conn.closing());
        assert_eq!(conn.input_len(), 0);
    }

    #[test]
    fn test_quit_stops_pipeline() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let mut conn = conn();

        conn.append_recv_data(b"*1\r\n$4\r\nQUIT\r\n*1\r\n$4\r\nPING\r\n");
        conn.process(&mut db);
        assert_eq!(conn.pending_write_data(), b"+OK\r\n");
        assert!(conn.closing());
    }

    #[test]
    fn test_backpressure_pauses_processing() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let mut conn = conn();

        let single = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
        let mut batch = Vec::new();
        for _ in 0..60_000 {
            batch.extend_from_slice(single);
        }
        conn.append_recv_data(&batch);
        conn.process(&mut db);

        let pending = conn.pending_write_len();
        assert!(
            pending <= Connection::MAX_PENDING_WRITE + 8,
            "pending write {pending} should stay near the threshold"
        );
        assert!(conn.input_len() > 0, "unprocessed input remains");
        assert!(!conn.should_read());

        // Draining the socket resumes processing.
        conn.advance_write(pending);
        conn.process(&mut db);
        assert!(conn.has_pending_write());
    }

    #[test]
    fn test_oversized_bulk_is_protocol_error() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let options = ParseOptions {
            max_bulk_len: 8,
            ..ParseOptions::default()
        };
        let mut conn = Connection::new(1024, options);

        conn.append_recv_data(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$100\r\n");
        conn.process(&mut db);
        assert_eq!(conn.pending_write_data(), b"-ERR protocol error\r\n");
        assert!(conn.closing());
    }
}
