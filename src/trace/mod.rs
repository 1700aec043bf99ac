//! Reflective call-site traces.
//!
//! A trace entry is one line of the form
//!
//! ```text
//! kind;target;container;line;metadata[;count]
//! ```
//!
//! where `kind` names the reflective primitive (`Method.invoke`), `target` is
//! what it resolved to, and `container`/`line` locate the call site. The
//! trailing count is written for entries recorded by a counting run, and is
//! kept on every later merge.

mod counts;
mod recorder;
mod sink;

pub use self::counts::{merge_log, MergedLog, TraceLog};
pub use self::recorder::{FlushSummary, Recorder, TraceRecorder};
pub use self::sink::{MergeSummary, SinkKind, SinkStatus, TraceSink, QUEUE_CAPACITY};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SEPARATOR: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TraceKind {
    ClassForName,
    ClassNewInstance,
    ClassGetMethod,
    ClassGetDeclaredMethod,
    ClassGetMethods,
    ClassGetDeclaredMethods,
    ClassGetConstructor,
    ClassGetDeclaredConstructor,
    ConstructorNewInstance,
    MethodInvoke,
}

impl TraceKind {
    pub const ALL: [TraceKind; 10] = [
        TraceKind::ClassForName,
        TraceKind::ClassNewInstance,
        TraceKind::ClassGetMethod,
        TraceKind::ClassGetDeclaredMethod,
        TraceKind::ClassGetMethods,
        TraceKind::ClassGetDeclaredMethods,
        TraceKind::ClassGetConstructor,
        TraceKind::ClassGetDeclaredConstructor,
        TraceKind::ConstructorNewInstance,
        TraceKind::MethodInvoke,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TraceKind::ClassForName => "Class.forName",
            TraceKind::ClassNewInstance => "Class.newInstance",
            TraceKind::ClassGetMethod => "Class.getMethod",
            TraceKind::ClassGetDeclaredMethod => "Class.getDeclaredMethod",
            TraceKind::ClassGetMethods => "Class.getMethods",
            TraceKind::ClassGetDeclaredMethods => "Class.getDeclaredMethods",
            TraceKind::ClassGetConstructor => "Class.getConstructor",
            TraceKind::ClassGetDeclaredConstructor => "Class.getDeclaredConstructor",
            TraceKind::ConstructorNewInstance => "Constructor.newInstance",
            TraceKind::MethodInvoke => "Method.invoke",
        }
    }
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraceKind {
    type Err = TraceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TraceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TraceParseError::UnknownKind(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceParseError {
    #[error("unknown trace kind {0:?}")]
    UnknownKind(String),
    #[error("expected 5 or 6 fields, found {0}")]
    FieldCount(usize),
    #[error("bad line number {0:?}")]
    LineNumber(String),
    #[error("bad count {0:?}")]
    Count(String),
}

/// One distinct reflective call site and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceEntry {
    pub kind: TraceKind,
    pub target: String,
    pub container: String,
    pub line: Option<u32>,
    pub metadata: String,
}

impl TraceEntry {
    /// Builds an entry, replacing separators and line breaks in the text
    /// fields so the entry always serialises to a single well-formed line.
    pub fn new(
        kind: TraceKind,
        target: &str,
        container: &str,
        line: Option<u32>,
        metadata: &str,
    ) -> Self {
        TraceEntry {
            kind,
            target: sanitize(target),
            container: sanitize(container),
            line,
            metadata: sanitize(metadata),
        }
    }

    /// Serialises the entry without a trailing newline.
    pub fn to_line(&self, count: Option<u64>) -> String {
        let line = self.line.map(|l| l.to_string()).unwrap_or_default();
        let mut out = format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.kind, self.target, self.container, line, self.metadata
        );
        if let Some(count) = count {
            out.push(SEPARATOR);
            out.push_str(&count.to_string());
        }
        out
    }

    /// Parses a line produced by [`to_line`](Self::to_line).
    pub fn parse_line(line: &str) -> Result<(TraceEntry, Option<u64>), TraceParseError> {
        let fields: Vec<&str> = line.split(SEPARATOR).collect();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(TraceParseError::FieldCount(fields.len()));
        }

        let kind: TraceKind = fields[0].parse()?;
        let line_no = match fields[3] {
            "" => None,
            n => Some(n.parse().map_err(|_| TraceParseError::LineNumber(n.to_owned()))?),
        };
        let count = match fields.get(5) {
            Some(c) => Some(c.parse().map_err(|_| TraceParseError::Count((*c).to_owned()))?),
            None => None,
        };

        let entry = TraceEntry {
            kind,
            target: fields[1].to_owned(),
            container: fields[2].to_owned(),
            line: line_no,
            metadata: fields[4].to_owned(),
        };
        Ok((entry, count))
    }
}

fn sanitize(field: &str) -> String {
    field
        .chars()
        .map(|c| match c {
            SEPARATOR | '\n' | '\r' => '_',
            c => c,
        })
        .collect()
}
