//! Parsed line outcomes
//!
//! Every input line becomes exactly one [`Entry`]: either a [`Record`] bound
//! for the output sink or a [`ParseFailure`] bound for the error sink.

use std::borrow::Cow;
use std::fmt;

/// A single field of a parsed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Successfully decoded text
    Text(String),
    /// Bytes no configured encoding could decode, passed through untouched
    Raw(Vec<u8>),
}

impl Field {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Field::Text(text) => text.as_bytes(),
            Field::Raw(bytes) => bytes,
        }
    }

    /// Text view of the field, replacing undecodable bytes for display
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Field::Text(text) => Cow::Borrowed(text),
            Field::Raw(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Field::Raw(_))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_string())
    }
}

/// A successfully split line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based line number in the source file
    pub line: u64,
    pub fields: Vec<Field>,
}

impl Record {
    pub fn new(line: u64, fields: Vec<Field>) -> Self {
        Self { line, fields }
    }

    /// Field texts, lossily decoded where a field stayed raw
    pub fn texts(&self) -> Vec<Cow<'_, str>> {
        self.fields.iter().map(Field::to_text).collect()
    }
}

/// Why a line could not be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NoDelimiter,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoDelimiter => write!(f, "Couldn't determine delimiter"),
        }
    }
}

/// A line that could not be parsed, kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub line: u64,
    pub raw: Vec<u8>,
    pub reason: FailureReason,
}

impl ParseFailure {
    pub fn no_delimiter(line: u64, raw: &[u8]) -> Self {
        Self {
            line,
            raw: raw.to_vec(),
            reason: FailureReason::NoDelimiter,
        }
    }

    pub fn raw_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }
}

/// What a sink receives for one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Record(Record),
    Failure(ParseFailure),
}

impl Entry {
    pub fn line(&self) -> u64 {
        match self {
            Entry::Record(record) => record.line,
            Entry::Failure(failure) => failure.line,
        }
    }
}

impl From<Record> for Entry {
    fn from(record: Record) -> Self {
        Entry::Record(record)
    }
}

impl From<ParseFailure> for Entry {
    fn from(failure: ParseFailure) -> Self {
        Entry::Failure(failure)
    }
}
