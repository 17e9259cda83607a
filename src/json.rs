// Copyright (c) 2005, 2022 Atif Aziz. All rights reserved.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming JSON token reader.
//!
//! [`JsonTextReader`] pulls one token at a time from a [`BufRead`] without
//! building a document tree. Only the text of the current token and the
//! nesting stack are held in memory.

use std::{
    borrow::Cow,
    error::Error,
    fmt::Display,
    io::{self, BufRead},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    MissingValue,
    UnexpectedCharacter(u8),
    InvalidLiteral,
    InvalidNumber,
    InvalidEscapeSequence,
    ControlCharacterInString,
    UnterminatedString,
    UnterminatedArray,
    UnterminatedObject,
    ExpectedMemberName,
    InvalidMemberValueDelimiter,
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedCharacter(b) if b.is_ascii_graphic() => {
                write!(f, "UnexpectedCharacter({:?})", char::from(*b))
            }
            Self::UnexpectedCharacter(b) => write!(f, "UnexpectedCharacter(0x{b:02x})"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl Error for SyntaxError {}

/// Failure while pulling the next token.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("{error} at offset {offset}")]
    Syntax { error: SyntaxError, offset: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ReadError {
    pub fn syntax_error(&self) -> Option<SyntaxError> {
        match self {
            Self::Syntax { error, .. } => Some(*error),
            Self::Io(_) => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct JsonToken<'t> {
    kind: JsonTokenKind,
    text: &'t [u8],
}

impl<'t> JsonToken<'t> {
    fn new(kind: JsonTokenKind, text: &'t [u8]) -> Self {
        Self { kind, text }
    }

    pub fn kind(&self) -> JsonTokenKind {
        self.kind
    }

    /// Raw source bytes of the token. Strings and member names keep their
    /// quotes and escapes. String contents are not checked for valid UTF-8.
    pub fn text(&self) -> &'t [u8] {
        self.text
    }

    /// The token text with invalid UTF-8 replaced by U+FFFD.
    pub fn text_lossy(&self) -> Cow<'t, str> {
        String::from_utf8_lossy(self.text)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JsonTokenKind {
    Null,
    True,
    False,
    Number,
    String,
    ArrayStart,
    ArrayEnd,
    ObjectStart,
    ObjectEnd,
    ObjectMember,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ReaderState {
    ParseArrayFirst,
    ParseArrayNext,
    ParseObjectMemberName,
    ParseObjectMemberValue,
    ParseObjectMemberNext,
}

/// Pull-based JSON tokenizer over a buffered byte stream.
///
/// The input may hold several top-level values, with or without
/// whitespace between them. After
/// an error the reader's position is unspecified and it should be dropped.
#[derive(Debug)]
pub struct JsonTextReader<R> {
    reader: R,
    state_stack: Vec<ReaderState>,
    text: Vec<u8>,
    next: Option<u8>,
    offset: u64,
}

impl<R: BufRead> Iterator for JsonTextReader<R> {
    type Item = Result<JsonTokenKind, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
            .map(|token| token.map(|token| token.kind()))
            .transpose()
    }
}

impl<R: BufRead> JsonTextReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state_stack: Vec::new(),
            text: Vec::new(),
            next: None,
            offset: 0,
        }
    }

    /// Bytes consumed from the underlying stream so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next token, or `Ok(None)` once the stream is exhausted
    /// between top-level values.
    pub fn next_token(&mut self) -> Result<Option<JsonToken<'_>>, ReadError> {
        self.text.clear();
        let kind = match self.state_stack.pop() {
            Some(ReaderState::ParseArrayFirst) => self.parse_array_first()?,
            Some(ReaderState::ParseArrayNext) => self.parse_array_next()?,
            Some(ReaderState::ParseObjectMemberName) => self.parse_object_member_name()?,
            Some(ReaderState::ParseObjectMemberValue) => self.parse_object_member_value()?,
            Some(ReaderState::ParseObjectMemberNext) => self.parse_object_member_next()?,
            None => {
                let Some(b) = self.next_clean()? else {
                    return Ok(None);
                };
                self.back(b);
                self.parse()?
            }
        };
        Ok(Some(JsonToken::new(kind, &self.text)))
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.next.take() {
            self.offset += 1;
            return Ok(Some(b));
        }
        let b = loop {
            match self.reader.fill_buf() {
                Ok(buf) => break buf.first().copied(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if b.is_some() {
            self.reader.consume(1);
            self.offset += 1;
        }
        Ok(b)
    }

    fn back(&mut self, b: u8) {
        self.next = Some(b);
        self.offset -= 1;
    }

    fn syntax(&self, error: SyntaxError) -> ReadError {
        ReadError::Syntax {
            error,
            offset: self.offset,
        }
    }

    fn require(&self, b: Option<u8>, error: SyntaxError) -> Result<u8, ReadError> {
        b.ok_or_else(|| self.syntax(error))
    }

    fn parse_object_member_name(&mut self) -> Result<JsonTokenKind, ReadError> {
        let b = self.next_clean()?;
        match self.require(b, SyntaxError::UnterminatedObject)? {
            b'}' => {
                self.text.push(b'}');
                Ok(JsonTokenKind::ObjectEnd)
            }
            b => self.parse_member(b),
        }
    }

    fn parse_member(&mut self, quote: u8) -> Result<JsonTokenKind, ReadError> {
        if quote != b'"' {
            return Err(self.syntax(SyntaxError::ExpectedMemberName));
        }
        self.parse_string()?;
        self.state_stack.push(ReaderState::ParseObjectMemberValue);
        Ok(JsonTokenKind::ObjectMember)
    }

    fn parse_object_member_value(&mut self) -> Result<JsonTokenKind, ReadError> {
        let b = self.next_clean()?;
        if self.require(b, SyntaxError::UnterminatedObject)? != b':' {
            return Err(self.syntax(SyntaxError::InvalidMemberValueDelimiter));
        }
        self.state_stack.push(ReaderState::ParseObjectMemberNext);
        self.parse()
    }

    fn parse_object_member_next(&mut self) -> Result<JsonTokenKind, ReadError> {
        let b = self.next_clean()?;
        match self.require(b, SyntaxError::UnterminatedObject)? {
            b',' => {
                let b = self.next_clean()?;
                let b = self.require(b, SyntaxError::UnterminatedObject)?;
                self.parse_member(b)
            }
            b'}' => {
                self.text.push(b'}');
                Ok(JsonTokenKind::ObjectEnd)
            }
            b => Err(self.syntax(SyntaxError::UnexpectedCharacter(b))),
        }
    }

    fn parse_array_first(&mut self) -> Result<JsonTokenKind, ReadError> {
        let b = self.next_clean()?;
        match self.require(b, SyntaxError::UnterminatedArray)? {
            b']' => {
                self.text.push(b']');
                Ok(JsonTokenKind::ArrayEnd)
            }
            b => {
                self.back(b);
                self.state_stack.push(ReaderState::ParseArrayNext);
                self.parse()
            }
        }
    }

    fn parse_array_next(&mut self) -> Result<JsonTokenKind, ReadError> {
        let b = self.next_clean()?;
        match self.require(b, SyntaxError::UnterminatedArray)? {
            b',' => {
                self.state_stack.push(ReaderState::ParseArrayNext);
                self.parse()
            }
            b']' => {
                self.text.push(b']');
                Ok(JsonTokenKind::ArrayEnd)
            }
            b => Err(self.syntax(SyntaxError::UnexpectedCharacter(b))),
        }
    }

    /// Reads the rest of a string whose opening quote was already consumed.
    fn parse_string(&mut self) -> Result<(), ReadError> {
        self.text.push(b'"');
        loop {
            let b = self.read_byte()?;
            let b = self.require(b, SyntaxError::UnterminatedString)?;
            self.text.push(b);
            match b {
                b'"' => return Ok(()),
                b'\\' => self.parse_escape()?,
                0x00..=0x1f => return Err(self.syntax(SyntaxError::ControlCharacterInString)),
                _ => {}
            }
        }
    }

    fn parse_escape(&mut self) -> Result<(), ReadError> {
        let b = self.read_byte()?;
        let b = self.require(b, SyntaxError::UnterminatedString)?;
        self.text.push(b);
        match b {
            b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => Ok(()),
            b'u' => {
                for _ in 0..4 {
                    let h = self.read_byte()?;
                    let h = self.require(h, SyntaxError::UnterminatedString)?;
                    if !h.is_ascii_hexdigit() {
                        return Err(self.syntax(SyntaxError::InvalidEscapeSequence));
                    }
                    self.text.push(h);
                }
                Ok(())
            }
            _ => Err(self.syntax(SyntaxError::InvalidEscapeSequence)),
        }
    }

    /// Consumes a run of ASCII digits and returns how many were read.
    fn parse_digits(&mut self) -> Result<usize, ReadError> {
        let mut count = 0;
        while let Some(b) = self.read_byte()? {
            if b.is_ascii_digit() {
                self.text.push(b);
                count += 1;
            } else {
                self.back(b);
                break;
            }
        }
        Ok(count)
    }

    fn parse_number(&mut self, first: u8) -> Result<JsonTokenKind, ReadError> {
        self.text.push(first);
        let lead = if first == b'-' {
            match self.read_byte()? {
                Some(b) if b.is_ascii_digit() => {
                    self.text.push(b);
                    b
                }
                _ => return Err(self.syntax(SyntaxError::InvalidNumber)),
            }
        } else {
            first
        };

        // No leading zeros: `0` ends the integer part.
        if lead != b'0' {
            self.parse_digits()?;
        }

        let mut next = self.read_byte()?;
        if next == Some(b'.') {
            self.text.push(b'.');
            if self.parse_digits()? == 0 {
                return Err(self.syntax(SyntaxError::InvalidNumber));
            }
            next = self.read_byte()?;
        }

        if let Some(e @ (b'e' | b'E')) = next {
            self.text.push(e);
            let mut b = self.read_byte()?;
            if let Some(sign @ (b'+' | b'-')) = b {
                self.text.push(sign);
                b = self.read_byte()?;
            }
            match b {
                Some(d) if d.is_ascii_digit() => {
                    self.text.push(d);
                    self.parse_digits()?;
                }
                _ => return Err(self.syntax(SyntaxError::InvalidNumber)),
            }
            next = self.read_byte()?;
        }

        if let Some(b) = next {
            self.back(b);
        }
        Ok(JsonTokenKind::Number)
    }

    fn parse_literal(&mut self, literal: &'static [u8]) -> Result<(), ReadError> {
        self.text.push(literal[0]);
        for &expected in &literal[1..] {
            match self.read_byte()? {
                Some(b) if b == expected => self.text.push(b),
                _ => return Err(self.syntax(SyntaxError::InvalidLiteral)),
            }
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<JsonTokenKind, ReadError> {
        let b = self.next_clean()?;
        Ok(match self.require(b, SyntaxError::MissingValue)? {
            b'"' => {
                self.parse_string()?;
                JsonTokenKind::String
            }
            b'{' => {
                self.state_stack.push(ReaderState::ParseObjectMemberName);
                self.text.push(b'{');
                JsonTokenKind::ObjectStart
            }
            b'[' => {
                self.state_stack.push(ReaderState::ParseArrayFirst);
                self.text.push(b'[');
                JsonTokenKind::ArrayStart
            }
            b @ (b'-' | b'0'..=b'9') => self.parse_number(b)?,
            b't' => {
                self.parse_literal(b"true")?;
                JsonTokenKind::True
            }
            b'f' => {
                self.parse_literal(b"false")?;
                JsonTokenKind::False
            }
            b'n' => {
                self.parse_literal(b"null")?;
                JsonTokenKind::Null
            }
            b => return Err(self.syntax(SyntaxError::UnexpectedCharacter(b))),
        })
    }

    fn next_clean(&mut self) -> io::Result<Option<u8>> {
        while let Some(b) = self.read_byte()? {
            if !is_whitespace(b) {
                return Ok(Some(b));
            }
        }
        Ok(None)
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    use JsonTokenKind::*;

    fn kinds(json: &str) -> Result<Vec<JsonTokenKind>, ReadError> {
        JsonTextReader::new(Cursor::new(json)).collect()
    }

    fn texts(json: &str) -> Vec<std::string::String> {
        let mut reader = JsonTextReader::new(Cursor::new(json));
        let mut texts = Vec::new();
        while let Some(token) = reader.next_token().unwrap() {
            texts.push(token.text_lossy().into_owned());
        }
        texts
    }

    fn syntax_error(json: &str) -> SyntaxError {
        let err = kinds(json).unwrap_err();
        err.syntax_error()
            .unwrap_or_else(|| panic!("expected a syntax error, got {err}"))
    }

    #[test]
    fn empty_object_is_two_tokens() {
        assert_eq!(kinds("{}").unwrap(), vec![ObjectStart, ObjectEnd]);
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert_eq!(kinds("").unwrap(), vec![]);
        assert_eq!(kinds(" \n\t\r ").unwrap(), vec![]);
    }

    #[test]
    fn punctuation_is_not_counted() {
        assert_eq!(
            kinds(r#"{"a": [1, true, false, null], "b": {"c": "d"}}"#).unwrap(),
            vec![
                ObjectStart,
                ObjectMember,
                ArrayStart,
                Number,
                True,
                False,
                Null,
                ArrayEnd,
                ObjectMember,
                ObjectStart,
                ObjectMember,
                String,
                ObjectEnd,
                ObjectEnd,
            ]
        );
    }

    #[test]
    fn token_text_is_raw_source() {
        assert_eq!(
            texts(r#"{"k\"ey": -12.5e+3, "u": "é\n"}"#),
            vec!["{", r#""k\"ey""#, "-12.5e+3", r#""u""#, r#""é\n""#, "}"]
        );
    }

    #[test]
    fn non_ascii_strings_are_accepted() {
        assert_eq!(texts(r#"["héllo", "日本"]"#)[1], r#""héllo""#);
    }

    #[test]
    fn numbers() {
        for n in ["0", "-0", "7", "-12", "3.25", "1e9", "1E-9", "-0.5e+10"] {
            assert_eq!(kinds(&format!("[{n}]")).unwrap(), vec![ArrayStart, Number, ArrayEnd]);
            assert_eq!(texts(n), vec![n]);
        }
    }

    #[test]
    fn malformed_numbers() {
        assert_eq!(syntax_error("[-]"), SyntaxError::InvalidNumber);
        assert_eq!(syntax_error("[1.]"), SyntaxError::InvalidNumber);
        assert_eq!(syntax_error("[1e]"), SyntaxError::InvalidNumber);
        assert_eq!(syntax_error("[01]"), SyntaxError::UnexpectedCharacter(b'1'));
        assert_eq!(syntax_error("[+1]"), SyntaxError::UnexpectedCharacter(b'+'));
    }

    #[test]
    fn multiple_top_level_values() {
        assert_eq!(
            kinds("{} [] 1 \"x\"\nnull").unwrap(),
            vec![ObjectStart, ObjectEnd, ArrayStart, ArrayEnd, Number, String, Null]
        );
        assert_eq!(kinds("{}{}").unwrap(), vec![ObjectStart, ObjectEnd, ObjectStart, ObjectEnd]);
    }

    #[test]
    fn adjacent_top_level_values() {
        assert_eq!(kinds("true{}").unwrap(), vec![True, ObjectStart, ObjectEnd]);
        assert_eq!(kinds(r#""a""b""#).unwrap(), vec![String, String]);
        assert_eq!(kinds("[1]2").unwrap(), vec![ArrayStart, Number, ArrayEnd, Number]);
    }

    #[test]
    fn top_level_scalar_is_returned_before_fault() {
        let mut reader = JsonTextReader::new(Cursor::new("1x"));
        assert_eq!(reader.next().unwrap().unwrap(), Number);
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.syntax_error(), Some(SyntaxError::UnexpectedCharacter(b'x')));
        assert_eq!(err.to_string(), "UnexpectedCharacter('x') at offset 2");
    }

    #[test]
    fn truncated_input() {
        assert_eq!(syntax_error("{"), SyntaxError::UnterminatedObject);
        assert_eq!(syntax_error(r#"{"a""#), SyntaxError::UnterminatedObject);
        assert_eq!(syntax_error(r#"{"a":"#), SyntaxError::MissingValue);
        assert_eq!(syntax_error(r#"{"a":1"#), SyntaxError::UnterminatedObject);
        assert_eq!(syntax_error("[1,"), SyntaxError::MissingValue);
        assert_eq!(syntax_error("[1"), SyntaxError::UnterminatedArray);
        assert_eq!(syntax_error(r#"["ab"#), SyntaxError::UnterminatedString);
        assert_eq!(syntax_error(r#"["\u00"#), SyntaxError::UnterminatedString);
        assert_eq!(syntax_error("[tru"), SyntaxError::InvalidLiteral);
    }

    #[test]
    fn malformed_structure() {
        assert_eq!(syntax_error("[1,]"), SyntaxError::UnexpectedCharacter(b']'));
        assert_eq!(syntax_error(r#"{"a":1,}"#), SyntaxError::ExpectedMemberName);
        assert_eq!(syntax_error("{a:1}"), SyntaxError::ExpectedMemberName);
        assert_eq!(syntax_error(r#"{"a" 1}"#), SyntaxError::InvalidMemberValueDelimiter);
        assert_eq!(syntax_error("[1 2]"), SyntaxError::UnexpectedCharacter(b'2'));
        assert_eq!(syntax_error("// comment\n{}"), SyntaxError::UnexpectedCharacter(b'/'));
        assert_eq!(syntax_error("[nul]"), SyntaxError::InvalidLiteral);
    }

    #[test]
    fn malformed_strings() {
        assert_eq!(syntax_error(r#"["\x"]"#), SyntaxError::InvalidEscapeSequence);
        assert_eq!(syntax_error(r#"["\u12g4"]"#), SyntaxError::InvalidEscapeSequence);
        assert_eq!(syntax_error("[\"a\nb\"]"), SyntaxError::ControlCharacterInString);

    }

    #[test]
    fn invalid_utf8_in_strings_is_tolerated() {
        let bytes: &[u8] = b"[\"a\xffb\"]";
        let mut reader = JsonTextReader::new(bytes);
        assert_eq!(reader.next_token().unwrap().unwrap().kind(), ArrayStart);
        let token = reader.next_token().unwrap().unwrap();
        assert_eq!(token.kind(), String);
        assert_eq!(token.text(), b"\"a\xffb\"");
        assert_eq!(token.text_lossy(), "\"a\u{fffd}b\"");
        assert_eq!(reader.next_token().unwrap().unwrap().kind(), ArrayEnd);
        assert!(reader.next_token().unwrap().is_none());
    }

    #[test]
    fn tokens_before_fault_are_returned() {
        let mut reader = JsonTextReader::new(Cursor::new(r#"[1, 2, x]"#));
        assert_eq!(reader.next().unwrap().unwrap(), ArrayStart);
        assert_eq!(reader.next().unwrap().unwrap(), Number);
        assert_eq!(reader.next().unwrap().unwrap(), Number);
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(err.syntax_error(), Some(SyntaxError::UnexpectedCharacter(b'x')));
        assert_eq!(err.to_string(), "UnexpectedCharacter('x') at offset 8");
    }

    #[test]
    fn offset_tracks_consumed_bytes() {
        let mut reader = JsonTextReader::new(Cursor::new("  [10, 2]"));
        reader.next_token().unwrap();
        assert_eq!(reader.offset(), 3);
        reader.next_token().unwrap();
        assert_eq!(reader.offset(), 5);
    }

    #[test]
    fn buffer_size_does_not_change_tokens() {
        let json = r#"{"rates": [{"code": "CPT", "price": 12.75, "ok": true}, null, [], -3e2]}"#;
        let expected = kinds(json).unwrap();
        for capacity in [1, 2, 3, 7, 64, 1024 * 1024] {
            let reader = BufReader::with_capacity(capacity, json.as_bytes());
            let actual: Vec<_> = JsonTextReader::new(reader).collect::<Result<_, _>>().unwrap();
            assert_eq!(actual, expected, "capacity {capacity}");
        }
    }

    #[test]
    fn io_errors_are_reported_as_io() {
        struct Failing;

        impl io::Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }

        let err = kinds_of(BufReader::new(Failing)).unwrap_err();
        assert!(matches!(err, ReadError::Io(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }

    fn kinds_of<R: BufRead>(reader: R) -> Result<Vec<JsonTokenKind>, ReadError> {
        JsonTextReader::new(reader).collect()
    }
}
