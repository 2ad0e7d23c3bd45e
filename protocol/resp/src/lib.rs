//! RESP-2 wire protocol support.
//!
//! Clients send commands as arrays of bulk strings; the server replies with
//! simple strings, errors, integers, and (possibly null) bulk strings. This
//! crate provides an incremental, binary-safe parser for the request side
//! and encoders for the reply side.

pub mod encode;
mod error;
mod request;

pub use error::ParseError;
pub use request::{ParseOptions, Request};
