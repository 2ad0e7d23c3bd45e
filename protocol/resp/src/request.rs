//! Request framing.
//!
//! A RESP-2 request is a single array of bulk strings:
//! `*<n>\r\n` followed by `n` occurrences of `$<len>\r\n<len bytes>\r\n`.
//! Parsing is zero-copy - the returned arguments reference slices of the
//! input buffer.

use crate::error::ParseError;

/// Hard ceiling on array element counts, to reject hostile headers before
/// any allocation is sized from them.
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Limits applied while framing a request.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Maximum length of a single bulk string (key or value).
    pub max_bulk_len: usize,
    /// Maximum number of elements in the command array.
    pub max_array_len: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            // RESP-2 convention allows up to 512 MiB; servers may cap lower.
            max_bulk_len: 512 * 1024 * 1024,
            max_array_len: MAX_ARRAY_LEN,
        }
    }
}

/// A framed request: the raw argument vector of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub args: Vec<&'a [u8]>,
}

impl<'a> Request<'a> {
    /// Frame one command from the front of `buffer`.
    ///
    /// Returns the argument vector and the number of bytes consumed. The
    /// caller advances its buffer by that amount; on `Err(Incomplete)`
    /// nothing was consumed and the caller should read more bytes first.
    pub fn parse(
        buffer: &'a [u8],
        options: &ParseOptions,
    ) -> Result<(Self, usize), ParseError> {
        let mut cursor = Cursor::new(buffer, options.max_bulk_len);

        if cursor.remaining() < 1 {
            return Err(ParseError::Incomplete);
        }
        if cursor.get_u8() != b'*' {
            return Err(ParseError::Protocol("expected array".to_string()));
        }

        let count = cursor.read_integer()?;
        if count < 1 {
            return Err(ParseError::Protocol(
                "array must have at least 1 element".to_string(),
            ));
        }
        let max_array = options.max_array_len.min(MAX_ARRAY_LEN);
        if count > max_array {
            return Err(ParseError::ArrayTooLarge {
                count,
                max: max_array,
            });
        }

        let mut args = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            args.push(cursor.read_bulk_string()?);
        }

        Ok((Request { args }, cursor.position()))
    }
}

/// A cursor for reading RESP framing from a buffer.
struct Cursor<'a> {
    buffer: &'a [u8],
    pos: usize,
    max_bulk_len: usize,
}

impl<'a> Cursor<'a> {
    fn new(buffer: &'a [u8], max_bulk_len: usize) -> Self {
        Self {
            buffer,
            pos: 0,
            max_bulk_len,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    #[inline]
    fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn get_u8(&mut self) -> u8 {
        let b = self.buffer[self.pos];
        self.pos += 1;
        b
    }

    fn read_integer(&mut self) -> Result<usize, ParseError> {
        let line = self.read_line()?;

        if line.is_empty() {
            return Err(ParseError::InvalidInteger("empty integer".to_string()));
        }

        // usize::MAX is at most 20 digits, so 19 is a safe limit.
        if line.len() > 19 {
            return Err(ParseError::InvalidInteger("integer too large".to_string()));
        }

        let mut result = 0usize;
        for &byte in line {
            if !byte.is_ascii_digit() {
                return Err(ParseError::InvalidInteger(
                    "non-digit character".to_string(),
                ));
            }
            result = result
                .checked_mul(10)
                .and_then(|r| r.checked_add((byte - b'0') as usize))
                .ok_or_else(|| ParseError::InvalidInteger("integer overflow".to_string()))?;
        }
        Ok(result)
    }

    fn read_bulk_string(&mut self) -> Result<&'a [u8], ParseError> {
        if self.remaining() < 1 {
            return Err(ParseError::Incomplete);
        }

        if self.get_u8() != b'$' {
            return Err(ParseError::Protocol("expected bulk string".to_string()));
        }

        let len = self.read_integer()?;

        if len > self.max_bulk_len {
            return Err(ParseError::BulkStringTooLong {
                len,
                max: self.max_bulk_len,
            });
        }

        if self.remaining() < len + 2 {
            return Err(ParseError::Incomplete);
        }

        let data = &self.buffer[self.pos..self.pos + len];
        self.pos += len;

        if self.get_u8() != b'\r' || self.get_u8() != b'\n' {
            return Err(ParseError::Protocol(
                "expected CRLF after bulk string".to_string(),
            ));
        }

        Ok(data)
    }

    fn read_line(&mut self) -> Result<&'a [u8], ParseError> {
        let start = self.pos;
        let slice = &self.buffer[start..];

        if let Some(pos) = memchr::memchr(b'\r', slice)
            && pos + 1 < slice.len()
            && slice[pos + 1] == b'\n'
        {
            let end = start + pos;
            let line = &self.buffer[start..end];
            self.pos = end + 2;
            return Ok(line);
        }

        Err(ParseError::Incomplete)
    }
}
