//! Command dispatch - bridges framed requests to engine operations.

use crate::metrics::{DELETES, GETS, HITS, MISSES, SETS};
use blinkdb_cache::BlinkDb;
use bytes::BytesMut;
use protocol_resp::encode;

/// Execute one framed command, appending its reply to `out`.
///
/// Returns `true` when the connection should close once the reply has been
/// flushed (QUIT). Arity errors are ordinary replies: the request was
/// fully framed, so the connection stays usable.
pub fn execute(args: &[&[u8]], db: &mut BlinkDb, out: &mut BytesMut) -> bool {
    let Some(name) = args.first() else {
        // The parser rejects empty arrays; nothing to do.
        return false;
    };

    if name.eq_ignore_ascii_case(b"ping") {
        match args.get(1) {
            Some(msg) => encode::simple_string(out, msg),
            None => encode::simple_string(out, b"PONG"),
        }
        return false;
    }

    if name.eq_ignore_ascii_case(b"set") {
        if args.len() != 3 {
            encode::error(out, "ERR wrong number of arguments for 'set'");
            return false;
        }
        SETS.increment();
        db.set(args[1], args[2]);
        encode::simple_string(out, b"OK");
        return false;
    }

    if name.eq_ignore_ascii_case(b"get") {
        if args.len() != 2 {
            encode::error(out, "ERR wrong number of arguments for 'get'");
            return false;
        }
        GETS.increment();
        match db.get(args[1]) {
            Some(value) => {
                HITS.increment();
                encode::bulk_string(out, &value);
            }
            None => {
                MISSES.increment();
                encode::null_bulk(out);
            }
        }
        return false;
    }

    if name.eq_ignore_ascii_case(b"del") {
        if args.len() != 2 {
            encode::error(out, "ERR wrong number of arguments for 'del'");
            return false;
        }
        DELETES.increment();
        encode::integer(out, if db.del(args[1]) { 1 } else { 0 });
        return false;
    }

    if name.eq_ignore_ascii_case(b"quit") {
        encode::simple_string(out, b"OK");
        return true;
    }

    encode::error(out, "ERR unknown command");
    false
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

    fn run(db: &mut BlinkDb, args: &[&[u8]]) -> (Vec<u8>, bool) {
        let mut out = BytesMut::new();
        let close = execute(args, db, &mut out);
        (out.to_vec(), close)
    }

    #[test]
    fn test_ping() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        assert_eq!(run(&mut db, &[b"PING"]), (b"+PONG\r\n".to_vec(), false));
        assert_eq!(
            run(&mut db, &[b"PING", b"hello"]),
            (b"+hello\r\n".to_vec(), false)
        );
    }

    #[test]
    fn test_set_get_del_replies() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());

        assert_eq!(
            run(&mut db, &[b"SET", b"k", b"v"]),
            (b"+OK\r\n".to_vec(), false)
        );
        assert_eq!(
            run(&mut db, &[b"GET", b"k"]),
            (b"$1\r\nv\r\n".to_vec(), false)
        );
        assert_eq!(run(&mut db, &[b"DEL", b"k"]), (b":1\r\n".to_vec(), false));
        assert_eq!(run(&mut db, &[b"GET", b"k"]), (b"$-1\r\n".to_vec(), false));
        assert_eq!(run(&mut db, &[b"DEL", b"k"]), (b":0\r\n".to_vec(), false));
    }

    #[test]
    fn test_case_insensitive_dispatch() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        assert_eq!(
            run(&mut db, &[b"set", b"k", b"v"]),
            (b"+OK\r\n".to_vec(), false)
        );
        assert_eq!(
            run(&mut db, &[b"GeT", b"k"]),
            (b"$1\r\nv\r\n".to_vec(), false)
        );
        assert_eq!(run(&mut db, &[b"pInG"]), (b"+PONG\r\n".to_vec(), false));
    }

    #[test]
    fn test_wrong_arity_keeps_connection() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        assert_eq!(
            run(&mut db, &[b"SET", b"k"]),
            (
                b"-ERR wrong number of arguments for 'set'\r\n".to_vec(),
                false
            )
        );
        assert_eq!(
            run(&mut db, &[b"SET", b"k", b"v", b"extra"]),
            (
                b"-ERR wrong number of arguments for 'set'\r\n".to_vec(),
                false
            )
        );
        assert_eq!(
            run(&mut db, &[b"GET"]),
            (
                b"-ERR wrong number of arguments for 'get'\r\n".to_vec(),
                false
            )
        );
        assert_eq!(
            run(&mut db, &[b"DEL"]),
            (
                b"-ERR wrong number of arguments for 'del'\r\n".to_vec(),
                false
            )
        );
    }

    #[test]
    fn test_unknown_command() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        assert_eq!(
            run(&mut db, &[b"SUBSCRIBE", b"ch"]),
            (b"-ERR unknown command\r\n".to_vec(), false)
        );
    }

    #[test]
    fn test_quit_closes() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        assert_eq!(run(&mut db, &[b"QUIT"]), (b"+OK\r\n".to_vec(), true));
    }

    #[test]
    fn test_binary_value_roundtrip() {
        let dir = tempdir().unwrap();
        let mut db = db(dir.path());
        let value: &[u8] = b"\x00\x01\r\n\xff";
        run(&mut db, &[b"SET", b"bin", value]);
        assert_eq!(
            run(&mut db, &[b"GET", b"bin"]),
            (b"$5\r\n\x00\x01\r\n\xff\r\n".to_vec(), false)
        );
    }
}
