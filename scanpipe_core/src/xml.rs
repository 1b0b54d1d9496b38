use crate::exporter::{ExportSession, Exporter, ExporterError, split_session_info};
use crate::fetcher::{FetcherRegistry, ResultRow};
use chrono::{Local, NaiveDateTime};
use std::borrow::Cow;
use std::fmt;
use std::io::{self, BufWriter, Write};
use tracing::{debug, trace};

const GENERATOR: &str = concat!("scanpipe ", env!("CARGO_PKG_VERSION"));
/// Twelve-hour clock without an AM/PM marker, as existing report readers expect.
const TIME_FORMAT: &str = "%Y-%m-%d %I:%M:%S";

/// Writes scan results as a single `scanning_report` XML document.
///
/// A document has exactly one root element, so an existing report cannot be
/// extended and append mode is always refused.
#[derive(Debug, Clone)]
pub struct XmlExporter {
    timestamp: Option<NaiveDateTime>,
    website: Option<String>,
    append: bool,
}

impl Default for XmlExporter {
    fn default() -> Self {
        let homepage = env!("CARGO_PKG_HOMEPAGE");
        Self {
            timestamp: None,
            website: (!homepage.is_empty()).then(|| homepage.to_string()),
            append: false,
        }
    }
}

impl XmlExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the `time` attribute instead of using the local time at `start`.
    pub fn with_timestamp(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }

    /// Names the project website in a second provenance comment.
    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }
}

impl Exporter for XmlExporter {
    fn label(&self) -> &'static str {
        "exporter.xml"
    }

    fn file_extension(&self) -> &'static str {
        "xml"
    }

    fn supports_append(&self) -> bool {
        false
    }

    fn append(&self) -> bool {
        self.append
    }

    fn store_append(&mut self, append: bool) {
        self.append = append;
    }

    fn start<'a>(
        &self,
        sink: Box<dyn Write + Send + 'a>,
        fetchers: FetcherRegistry,
        session_info: &str,
    ) -> Result<Box<dyn ExportSession + 'a>, ExporterError> {
        let timestamp = self
            .timestamp
            .unwrap_or_else(|| Local::now().naive_local());
        let (feeder_name, feeder_info) = split_session_info(session_info);

        let mut session = XmlSession {
            out: BufWriter::new(sink),
            fetchers,
            rows_written: 0,
            write_error: None,
        };

        session.emit(format_args!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <!-- This file has been generated by {GENERATOR} -->\n"
        ));
        if let Some(website) = &self.website {
            session.emit(format_args!(
                "<!-- Visit the website at {} -->\n",
                website.replace("--", "- -")
            ));
        }
        session.emit(format_args!(
            "<scanning_report time=\"{}\">\n",
            timestamp.format(TIME_FORMAT)
        ));
        match feeder_name {
            Some(name) => session.emit(format_args!(
                "\t<feeder name=\"{}\">{}</feeder>\n",
                escape_attribute(name),
                Cdata(feeder_info)
            )),
            None => session.emit(format_args!("\t<feeder>{}</feeder>\n", Cdata(feeder_info))),
        }
        session.emit(format_args!("\t<hosts>\n"));

        debug!(
            fetchers = session.fetchers.len(),
            feeder = feeder_name.unwrap_or(""),
            "xml export started"
        );
        Ok(Box::new(session))
    }
}

/// One XML document being written.
///
/// The first write failure is kept and every later write skipped; the
/// failure is returned from `end`.
pub struct XmlSession<'a> {
    out: BufWriter<Box<dyn Write + Send + 'a>>,
    fetchers: FetcherRegistry,
    rows_written: usize,
    write_error: Option<io::Error>,
}

impl XmlSession<'_> {
    fn emit(&mut self, args: fmt::Arguments<'_>) {
        if self.write_error.is_some() {
            return;
        }
        if let Err(err) = self.out.write_fmt(args) {
            debug!(error = %err, "xml export write failed, deferring to end of session");
            self.write_error = Some(err);
        }
    }
}

impl ExportSession for XmlSession<'_> {
    fn next_row(&mut self, row: &ResultRow) -> Result<(), ExporterError> {
        if row.len() != self.fetchers.len() {
            return Err(ExporterError::RowShape {
                expected: self.fetchers.len(),
                found: row.len(),
            });
        }
        if !self.fetchers.owns(row) {
            return Err(ExporterError::ForeignRow {
                expected: self.fetchers.names().join(", "),
                found: row.names().join(", "),
            });
        }

        let address = row.address().to_string();
        trace!(%address, "xml export row");
        self.emit(format_args!(
            "\t\t<host address=\"{}\">\n",
            escape_attribute(&address)
        ));

        for (index, value) in row.results() {
            let name = escape_attribute(&self.fetchers.names()[index]).into_owned();
            let text = value.to_string();
            self.emit(format_args!(
                "\t\t\t<result name=\"{name}\">{}</result>\n",
                Cdata(&text)
            ));
        }

        self.emit(format_args!("\t\t</host>\n"));
        self.rows_written += 1;
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.rows_written
    }

    fn end(mut self: Box<Self>) -> Result<(), ExporterError> {
        self.emit(format_args!("\t</hosts>\n</scanning_report>\n"));
        let flushed = self.out.flush();

        if let Some(err) = self.write_error.take() {
            return Err(ExporterError::Flush(err));
        }
        flushed.map_err(ExporterError::Flush)?;

        debug!(rows = self.rows_written, "xml export finished");
        Ok(())
    }
}

/// Characters allowed anywhere in an XML 1.0 document.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n'
            | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Replaces characters XML cannot carry with U+FFFD.
fn replace_unrepresentable(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| if is_xml_char(c) { c } else { char::REPLACEMENT_CHARACTER })
            .collect(),
    )
}

/// Escapes markup-significant characters for use inside a quoted attribute.
///
/// Whitespace other than a space is written as a character reference so
/// parsers do not normalize it away.
fn escape_attribute(value: &str) -> Cow<'_, str> {
    let needs_escape =
        |c: char| matches!(c, '&' | '<' | '>' | '"' | '\'' | '\t' | '\n' | '\r') || !is_xml_char(c);
    if !value.chars().any(needs_escape) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' => escaped.push_str("&#9;"),
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            c if !is_xml_char(c) => escaped.push(char::REPLACEMENT_CHARACTER),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Character data wrapped in CDATA sections.
///
/// A `]]>` inside the text is split across two sections so the text comes
/// back unchanged when the document is parsed. Characters XML cannot carry
/// become U+FFFD.
struct Cdata<'t>(&'t str);

impl fmt::Display for Cdata<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<![CDATA[")?;
        let text = replace_unrepresentable(self.0);
        let mut parts = text.split("]]>");
        if let Some(first) = parts.next() {
            f.write_str(first)?;
        }
        for part in parts {
            f.write_str("]]]]><![CDATA[>")?;
            f.write_str(part)?;
        }
        f.write_str("]]>")
    }
}
