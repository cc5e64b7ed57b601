//! Reader and writer for the gettext PO/POT subset used by screenshot catalogs.
//!
//! Supported: a header entry (empty `msgid`, no `msgctxt`) holding `Key: Value`
//! fields, then entries with optional `#` comment lines, `msgctxt`, `msgid` and
//! `msgstr`. Strings may continue on following quoted lines. Plural forms are
//! rejected.

use std::fmt::Write as _;

use thiserror::Error;

use crate::{Catalog, CatalogHeader, Segment};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct FormatError {
    pub line: usize,
    pub message: String,
}

impl FormatError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Decode a catalog from raw file bytes.
pub fn decode(bytes: &[u8]) -> Result<Catalog, FormatError> {
    let text = std::str::from_utf8(bytes).map_err(|err| {
        let line = bytes[..err.valid_up_to()]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1;
        FormatError::new(line, "catalog is not valid UTF-8")
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut parser = Parser::default();
    for (idx, raw_line) in text.lines().enumerate() {
        parser.feed(idx + 1, raw_line)?;
    }
    parser.finish(text.lines().count() + 1)
}

/// Encode a catalog into PO text. Entry order and header fields are written as stored.
pub fn encode(catalog: &Catalog) -> Vec<u8> {
    let mut out = String::new();

    out.push_str("msgid \"\"\n");
    let header_text: String = catalog
        .header
        .fields()
        .iter()
        .map(|(key, value)| format!("{key}: {value}\n"))
        .collect();
    write_string(&mut out, "msgstr", &header_text);

    for segment in catalog.segments() {
        out.push('\n');
        for comment in &segment.comments {
            out.push_str(comment);
            out.push('\n');
        }
        if !segment.context.is_empty() {
            write_string(&mut out, "msgctxt", &segment.context);
        }
        write_string(&mut out, "msgid", &segment.source);
        write_string(&mut out, "msgstr", &segment.translation);
    }

    out.into_bytes()
}

fn write_string(out: &mut String, keyword: &str, value: &str) {
    let multiline = value.trim_end_matches('\n').contains('\n');
    if !multiline {
        let _ = writeln!(out, "{keyword} \"{}\"", escape(value));
        return;
    }

    let _ = writeln!(out, "{keyword} \"\"");
    for chunk in value.split_inclusive('\n') {
        let _ = writeln!(out, "\"{}\"", escape(chunk));
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unquote(line_no: usize, raw: &str) -> Result<String, FormatError> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| FormatError::new(line_no, "unterminated string"))?;

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('\\') => value.push('\\'),
                Some('"') => value.push('"'),
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('r') => value.push('\r'),
                Some(other) => {
                    return Err(FormatError::new(
                        line_no,
                        format!("unsupported escape sequence \\{other}"),
                    ))
                }
                None => return Err(FormatError::new(line_no, "unterminated string")),
            },
            '"' => return Err(FormatError::new(line_no, "unescaped quote inside string")),
            other => value.push(other),
        }
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Context,
    Id,
    Str,
}

#[derive(Debug, Default)]
struct PendingEntry {
    start_line: usize,
    comments: Vec<String>,
    context: Option<String>,
    id: Option<String>,
    translation: Option<String>,
}

impl PendingEntry {
    fn has_keywords(&self) -> bool {
        self.context.is_some() || self.id.is_some() || self.translation.is_some()
    }
}

#[derive(Debug, Default)]
struct Parser {
    header: Option<CatalogHeader>,
    segments: Vec<Segment>,
    pending: PendingEntry,
    current: Option<Field>,
    seen_entry: bool,
}

impl Parser {
    fn feed(&mut self, line_no: usize, raw_line: &str) -> Result<(), FormatError> {
        let line = raw_line.trim();

        if line.is_empty() {
            self.flush(line_no)?;
            return Ok(());
        }

        if line.starts_with('#') {
            // A comment after msgstr starts the next entry.
            if self.pending.translation.is_some() {
                self.flush(line_no)?;
            }
            self.pending.comments.push(raw_line.trim_end().to_string());
            self.current = None;
            return Ok(());
        }

        if line.starts_with('"') {
            let value = unquote(line_no, line)?;
            let slot = match self.current {
                Some(Field::Context) => self.pending.context.as_mut(),
                Some(Field::Id) => self.pending.id.as_mut(),
                Some(Field::Str) => self.pending.translation.as_mut(),
                None => None,
            };
            let slot = slot.ok_or_else(|| {
                FormatError::new(line_no, "continuation line without a keyword")
            })?;
            slot.push_str(&value);
            return Ok(());
        }

        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim_start()))
            .unwrap_or((line, ""));

        match keyword {
            "msgctxt" => {
                if self.pending.id.is_some() || self.pending.context.is_some() {
                    self.flush(line_no)?;
                }
                self.begin(line_no);
                self.pending.context = Some(unquote(line_no, rest)?);
                self.current = Some(Field::Context);
            }
            "msgid" => {
                if self.pending.id.is_some() {
                    self.flush(line_no)?;
                }
                self.begin(line_no);
                self.pending.id = Some(unquote(line_no, rest)?);
                self.current = Some(Field::Id);
            }
            "msgstr" => {
                if self.pending.id.is_none() {
                    return Err(FormatError::new(line_no, "msgstr without msgid"));
                }
                if self.pending.translation.is_some() {
                    return Err(FormatError::new(line_no, "duplicate msgstr"));
                }
                self.pending.translation = Some(unquote(line_no, rest)?);
                self.current = Some(Field::Str);
            }
            "msgid_plural" => {
                return Err(FormatError::new(line_no, "plural entries are not supported"))
            }
            other if other.starts_with("msgstr[") => {
                return Err(FormatError::new(line_no, "plural entries are not supported"))
            }
            other => {
                return Err(FormatError::new(
                    line_no,
                    format!("unknown keyword `{other}`"),
                ))
            }
        }
        Ok(())
    }

    fn begin(&mut self, line_no: usize) {
        if !self.pending.has_keywords() {
            self.pending.start_line = line_no;
        }
    }

    fn flush(&mut self, line_no: usize) -> Result<(), FormatError> {
        self.current = None;
        if !self.pending.has_keywords() {
            // Comments separated from their entry by a blank line stay pending.
            return Ok(());
        }

        let pending = std::mem::take(&mut self.pending);
        let start = pending.start_line.max(1);
        let id = pending
            .id
            .ok_or_else(|| FormatError::new(start, "entry without msgid"))?;
        let translation = pending
            .translation
            .ok_or_else(|| FormatError::new(line_no.saturating_sub(1).max(start), "msgid without msgstr"))?;

        let is_header = !self.seen_entry && id.is_empty() && pending.context.is_none();
        self.seen_entry = true;

        if is_header {
            self.header = Some(parse_header(start, &translation)?);
            return Ok(());
        }

        self.segments.push(Segment {
            context: pending.context.unwrap_or_default(),
            source: id,
            translation,
            comments: pending.comments,
        });
        Ok(())
    }

    fn finish(mut self, eof_line: usize) -> Result<Catalog, FormatError> {
        self.flush(eof_line)?;
        let mut catalog = Catalog::new(self.header.unwrap_or_default());
        for segment in self.segments {
            catalog.push(segment);
        }
        Ok(catalog)
    }
}

fn parse_header(line_no: usize, raw: &str) -> Result<CatalogHeader, FormatError> {
    let mut header = CatalogHeader::default();
    for field in raw.split('\n').filter(|l| !l.trim().is_empty()) {
        let (key, value) = field
            .split_once(':')
            .ok_or_else(|| FormatError::new(line_no, format!("malformed header field `{field}`")))?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        header.set(key.trim(), value);
    }
    Ok(header)
}
