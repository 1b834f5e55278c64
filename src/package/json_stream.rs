//! Streaming recognizer for the JSON subset used by signed data packages.
//!
//! A package's `data` value may be far too large to hold in memory, so a
//! general-purpose JSON parser (which buffers every string it decodes)
//! cannot be used. [`JsonStreamParser`] instead recognizes exactly the
//! subset the package format needs: one top-level object whose members
//! have string keys and string values, with no escapes, no nesting, no
//! arrays, no numbers. Any amount of whitespace (space, tab, CR, LF)
//! between tokens is accepted.
//!
//! For each key/value pair the handler is invoked with the decoded key and
//! a [`ValueReader`] that streams the value's bytes. The handler must read
//! the value to end-of-input (or return an error); parsing then resumes
//! after the value's closing quote. A handler may instead return
//! [`Flow::Halt`], which stops parsing immediately and leaves the
//! underlying source positioned after the last byte the handler consumed.
//!
//! The parser reads its source one byte at a time. This is required: once
//! a value's opening quote has been seen, the handler becomes the sole
//! consumer of the source until it stops, so the parser must never have
//! buffered past the quote.

use std::io::{self, Read};

use crate::error::{Error, Result};

/// Longest key the parser will buffer. The package format's longest legal
/// key is 22 bytes; anything larger is hostile or garbage.
const MAX_KEY_LEN: usize = 64;

/// Handler verdict after a key/value pair has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Resume parsing after the value's closing quote.
    Continue,
    /// Stop parsing, leaving the source where the handler left it.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekObjectStart,
    SeekKeyStart,
    SeekKeyEnd,
    SeekColon,
    SeekValueStart,
    SeekNextPair,
    ObjectEnd,
}

fn is_json_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\r' || b == b'\n'
}

/// Map a source read error to the crate error model: corrupt input forms
/// (invalid zlib data, escape rejection, truncation) are distinguished
/// from genuine I/O failures.
pub(crate) fn classify_source_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::InvalidData
        | io::ErrorKind::InvalidInput
        | io::ErrorKind::UnexpectedEof => Error::corrupt(err.to_string()),
        _ => Error::Io(err),
    }
}

/// Read one byte, retrying on interruption. `None` is end-of-input.
fn next_byte(source: &mut dyn Read) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match source.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify_source_error(e)),
        }
    }
}

/// Byte-at-a-time parser for one flat, string-only JSON object.
///
/// See the module documentation for the accepted grammar and the handler
/// contract.
pub struct JsonStreamParser<R> {
    source: R,
}

impl<R: Read> JsonStreamParser<R> {
    /// Create a parser over a byte source.
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Parse the object, delivering each key/value pair to `handler`.
    ///
    /// Returns `Ok(())` when the object (and any trailing whitespace) has
    /// been consumed to end-of-input, or as soon as the handler returns
    /// [`Flow::Halt`].
    pub fn parse<H>(&mut self, mut handler: H) -> Result<()>
    where
        H: FnMut(&str, &mut ValueReader<'_>) -> Result<Flow>,
    {
        let source = &mut self.source;
        let mut key_buf: Vec<u8> = Vec::with_capacity(MAX_KEY_LEN);
        let mut state = State::SeekObjectStart;

        loop {
            let b = match next_byte(source)? {
                Some(b) => b,
                None => {
                    if state == State::ObjectEnd {
                        return Ok(());
                    }
                    return Err(Error::corrupt("unexpected end of input before object end"));
                }
            };

            match state {
                State::SeekObjectStart => {
                    if b == b'{' {
                        state = State::SeekKeyStart;
                    } else if !is_json_whitespace(b) {
                        return Err(unexpected(b, "while seeking object start"));
                    }
                }

                State::SeekKeyStart => {
                    if b == b'"' {
                        key_buf.clear();
                        state = State::SeekKeyEnd;
                    } else if !is_json_whitespace(b) {
                        return Err(unexpected(b, "while seeking key start"));
                    }
                }

                State::SeekKeyEnd => {
                    if b == b'\\' {
                        return Err(Error::corrupt("unsupported escaped character in key"));
                    } else if b == b'"' {
                        state = State::SeekColon;
                    } else if key_buf.len() == MAX_KEY_LEN {
                        return Err(Error::corrupt("key too long"));
                    } else {
                        key_buf.push(b);
                    }
                }

                State::SeekColon => {
                    if b == b':' {
                        state = State::SeekValueStart;
                    } else if !is_json_whitespace(b) {
                        return Err(unexpected(b, "while seeking colon"));
                    }
                }

                State::SeekValueStart => {
                    if b == b'"' {
                        let key = std::str::from_utf8(&key_buf)
                            .map_err(|_| Error::corrupt("key is not valid UTF-8"))?;
                        let mut value = ValueReader::new(source);
                        match handler(key, &mut value)? {
                            Flow::Halt => return Ok(()),
                            Flow::Continue => {
                                if !value.is_done() {
                                    return Err(Error::corrupt(
                                        "string value not fully consumed",
                                    ));
                                }
                                state = State::SeekNextPair;
                            }
                        }
                    } else if !is_json_whitespace(b) {
                        return Err(unexpected(b, "while seeking value start"));
                    }
                }

                State::SeekNextPair => {
                    if b == b',' {
                        state = State::SeekKeyStart;
                    } else if b == b'}' {
                        state = State::ObjectEnd;
                    } else if !is_json_whitespace(b) {
                        return Err(unexpected(b, "while seeking next name/value pair"));
                    }
                }

                State::ObjectEnd => {
                    if !is_json_whitespace(b) {
                        return Err(unexpected(b, "after object end"));
                    }
                }
            }
        }
    }
}

fn unexpected(b: u8, context: &str) -> Error {
    Error::corrupt(format!("unexpected character {:?} {}", char::from(b), context))
}

/// Scanning core shared by [`ValueReader`] and the streaming verifier's
/// payload reader: forwards bytes until an unescaped `"`, which is
/// consumed but not returned, then reports end-of-input forever.
#[derive(Debug, Default)]
pub(crate) struct ValueScan {
    done: bool,
    pending: Option<io::Error>,
}

impl ValueScan {
    /// True once the value's closing quote has been consumed.
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Fill `buf` byte by byte, stopping at the first terminator or error.
    ///
    /// If an error occurs after bytes were already placed in `buf`, the
    /// filled count is returned and the error is delivered on the next
    /// call, so copy loops never drop bytes.
    pub(crate) fn read_value(&mut self, source: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        if let Some(err) = self.pending.take() {
            return Err(err);
        }

        let mut filled = 0;
        while filled < buf.len() {
            let mut byte = [0u8; 1];
            let err = match source.read(&mut byte) {
                Ok(0) => io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "unexpected end of input inside string value",
                ),
                Ok(_) if byte[0] == b'"' => {
                    self.done = true;
                    break;
                }
                Ok(_) if byte[0] == b'\\' => io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unsupported escaped character in string value",
                ),
                Ok(_) => {
                    buf[filled] = byte[0];
                    filled += 1;
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => e,
            };
            if filled > 0 {
                self.pending = Some(err);
                break;
            }
            return Err(err);
        }
        Ok(filled)
    }
}

/// Reader over the bytes of a single string value.
///
/// Created by [`JsonStreamParser`] when a value's opening quote is seen;
/// single-use, permanently end-of-input once the closing quote has been
/// consumed. A `\` in the value fails the read. Exclusive access is
/// enforced by the `&mut` receiver.
pub struct ValueReader<'a> {
    scan: ValueScan,
    source: &'a mut dyn Read,
}

impl<'a> ValueReader<'a> {
    fn new(source: &'a mut dyn Read) -> Self {
        Self {
            scan: ValueScan::default(),
            source,
        }
    }

    /// True once the closing quote has been consumed.
    pub fn is_done(&self) -> bool {
        self.scan.is_done()
    }
}

impl Read for ValueReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.scan.read_value(&mut *self.source, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect_pairs(input: &str) -> Result<Vec<(String, String)>> {
        let mut source = Cursor::new(input.as_bytes().to_vec());
        let mut parser = JsonStreamParser::new(&mut source);
        let mut pairs = Vec::new();
        parser.parse(|key, value| {
            let mut text = String::new();
            value
                .read_to_string(&mut text)
                .map_err(classify_source_error)?;
            pairs.push((key.to_string(), text));
            Ok(Flow::Continue)
        })?;
        Ok(pairs)
    }

    fn assert_corrupt(input: &str) {
        let err = collect_pairs(input).unwrap_err();
        assert!(
            matches!(err, Error::PackageCorrupt(_)),
            "expected corrupt for {:?}, got {:?}",
            input,
            err
        );
    }

    #[test]
    fn test_parses_flat_object() {
        let pairs = collect_pairs(r#"{"a":"1","b":"two","c":""}"#).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("c".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_whitespace_tolerated() {
        let pairs =
            collect_pairs(" \t\r\n {  \"a\"\t:\n\"1\" ,\r\"b\" : \"2\" }  \n ").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_key_accepted() {
        let pairs = collect_pairs(r#"{"":"v"}"#).unwrap();
        assert_eq!(pairs, vec![(String::new(), "v".to_string())]);
    }

    #[test]
    fn test_rejects_empty_object() {
        assert_corrupt("{}");
    }

    #[test]
    fn test_rejects_disallowed_constructs() {
        assert_corrupt(r#"{"a":1}"#);
        assert_corrupt(r#"{"a":true}"#);
        assert_corrupt(r#"{"a":null}"#);
        assert_corrupt(r#"{"a":["1"]}"#);
        assert_corrupt(r#"{"a":{"b":"c"}}"#);
        assert_corrupt(r#"["a"]"#);
    }

    #[test]
    fn test_rejects_escapes() {
        assert_corrupt(r#"{"a\"b":"v"}"#);
        assert_corrupt(r#"{"a":"x\"y"}"#);
        assert_corrupt(r#"{"a":"x\\y"}"#);
    }

    #[test]
    fn test_rejects_truncation() {
        assert_corrupt("{");
        assert_corrupt(r#"{"a"#);
        assert_corrupt(r#"{"a":"#);
        assert_corrupt(r#"{"a":"1"#);
        assert_corrupt(r#"{"a":"1""#);
        assert_corrupt(r#"{"a":"1","#);
        assert_corrupt("");
    }

    #[test]
    fn test_rejects_trailing_garbage() {
        assert_corrupt(r#"{"a":"1"} x"#);
        assert_corrupt(r#"{"a":"1"}}"#);
    }

    #[test]
    fn test_rejects_missing_separators() {
        assert_corrupt(r#"{"a" "1"}"#);
        assert_corrupt(r#"{"a":"1" "b":"2"}"#);
    }

    #[test]
    fn test_rejects_long_key() {
        let input = format!("{{\"{}\":\"v\"}}", "k".repeat(MAX_KEY_LEN + 1));
        assert_corrupt(&input);

        // A key at exactly the cap still parses
        let input = format!("{{\"{}\":\"v\"}}", "k".repeat(MAX_KEY_LEN));
        assert!(collect_pairs(&input).is_ok());
    }

    #[test]
    fn test_handler_must_drain_value() {
        let mut source = Cursor::new(r#"{"a":"1234"}"#.as_bytes().to_vec());
        let mut parser = JsonStreamParser::new(&mut source);
        let err = parser.parse(|_, _| Ok(Flow::Continue)).unwrap_err();
        assert!(matches!(err, Error::PackageCorrupt(_)));
    }

    #[test]
    fn test_halt_leaves_source_positioned() {
        let mut source = Cursor::new(r#"{"a":"hello","b":"world"}"#.as_bytes().to_vec());
        let mut parser = JsonStreamParser::new(&mut source);
        parser
            .parse(|_, value| {
                let mut prefix = [0u8; 2];
                value.read_exact(&mut prefix).unwrap();
                assert_eq!(&prefix, b"he");
                Ok(Flow::Halt)
            })
            .unwrap();

        // The source sits immediately after the last byte the handler read
        let mut rest = String::new();
        source.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, r#"llo","b":"world"}"#);
    }

    #[test]
    fn test_value_reader_chunked_reads() {
        let mut source = Cursor::new(r#"{"a":"abcdef"}"#.as_bytes().to_vec());
        let mut parser = JsonStreamParser::new(&mut source);
        parser
            .parse(|_, value| {
                let mut collected = Vec::new();
                let mut chunk = [0u8; 2];
                loop {
                    let n = value.read(&mut chunk).unwrap();
                    if n == 0 {
                        break;
                    }
                    collected.extend_from_slice(&chunk[..n]);
                }
                assert_eq!(collected, b"abcdef");
                // End-of-input is sticky
                assert_eq!(value.read(&mut chunk).unwrap(), 0);
                assert!(value.is_done());
                Ok(Flow::Continue)
            })
            .unwrap();
    }

    #[test]
    fn test_value_reader_escape_fails_read() {
        let mut source = Cursor::new(br#"{"a":"xy\n"}"#.to_vec());
        let mut parser = JsonStreamParser::new(&mut source);
        let err = parser
            .parse(|_, value| {
                let mut text = String::new();
                value
                    .read_to_string(&mut text)
                    .map_err(classify_source_error)?;
                Ok(Flow::Continue)
            })
            .unwrap_err();
        assert!(matches!(err, Error::PackageCorrupt(_)));
    }

    #[test]
    fn test_value_reader_reports_bytes_before_error() {
        let mut source = Cursor::new(br#"{"a":"xy\n"}"#.to_vec());
        let mut parser = JsonStreamParser::new(&mut source);
        parser
            .parse(|_, value| {
                let mut buf = [0u8; 8];
                // First call returns the two clean bytes
                assert_eq!(value.read(&mut buf).unwrap(), 2);
                assert_eq!(&buf[..2], b"xy");
                // The escape error arrives on the next call
                let err = value.read(&mut buf).unwrap_err();
                assert_eq!(err.kind(), io::ErrorKind::InvalidData);
                Ok(Flow::Halt)
            })
            .unwrap();
    }
}
