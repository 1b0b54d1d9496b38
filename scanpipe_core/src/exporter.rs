use crate::fetcher::{FetcherRegistry, RegistryError, ResultRow};
use std::io::Write;
use thiserror::Error;

/// Errors that can occur while configuring an exporter or driving a session.
#[derive(Error, Debug)]
pub enum ExporterError {
    /// The format cannot be appended to an existing output.
    #[error("{format} export does not support appending to existing output")]
    UnsupportedAppend { format: &'static str },

    /// The fetcher list handed to the exporter is unusable.
    #[error("Fetcher registry rejected: {0}")]
    Registry(#[from] RegistryError),

    /// A row does not line up with the session's fetcher registry.
    #[error("Row has {found} values but the session has {expected} fetchers")]
    RowShape { expected: usize, found: usize },

    /// A row of the right length was built against different fetcher columns.
    #[error("Row was built for fetchers [{found}] but the session writes [{expected}]")]
    ForeignRow { expected: String, found: String },

    /// Writing or flushing the output failed at some point during the session.
    #[error("Export output could not be written: {0}")]
    Flush(#[source] std::io::Error),
}

/// An `Exporter` describes an output format and opens export sessions in it.
///
/// The exporter itself holds no per-export state: every call to
/// [`Exporter::start`] returns a new [`ExportSession`] that owns the sink and
/// everything accumulated while rows are written. The expected call order is
/// `set_append` (optional), `start`, then `next_row` any number of times and
/// finally `end` on the returned session.
pub trait Exporter: Send + Sync {
    /// Label key identifying the format, e.g. for file-save dialogs.
    fn label(&self) -> &'static str;

    /// File name extension without the leading dot.
    fn file_extension(&self) -> &'static str;

    /// Whether output can be appended to an existing sink.
    fn supports_append(&self) -> bool;

    /// Whether the next session appends to existing output.
    fn append(&self) -> bool;

    /// Records whether the next session should append to existing output.
    fn store_append(&mut self, append: bool);

    /// Declares whether the next session should append to existing output.
    ///
    /// Formats that cannot be appended to fail immediately with
    /// `ExporterError::UnsupportedAppend` when `append` is `true`, and the
    /// previous setting is kept.
    fn set_append(&mut self, append: bool) -> Result<(), ExporterError> {
        if append && !self.supports_append() {
            return Err(ExporterError::UnsupportedAppend {
                format: self.label(),
            });
        }
        self.store_append(append);
        Ok(())
    }

    /// Opens a session writing to `sink` and emits the format preamble.
    ///
    /// `session_info` describes the address source; an optional label may
    /// precede the first `:`. The session can be moved to another thread
    /// because the sink must be `Send`.
    fn start<'a>(
        &self,
        sink: Box<dyn Write + Send + 'a>,
        fetchers: FetcherRegistry,
        session_info: &str,
    ) -> Result<Box<dyn ExportSession + 'a>, ExporterError>;
}

/// A live export: receives rows in order and finalizes the output.
pub trait ExportSession: Send {
    /// Writes one row.
    ///
    /// Rows built against a different fetcher registry are rejected.
    /// Output failures are not reported here; they surface from
    /// [`ExportSession::end`].
    fn next_row(&mut self, row: &ResultRow) -> Result<(), ExporterError>;

    /// Number of rows accepted so far.
    fn rows_written(&self) -> usize;

    /// Closes all open structure and flushes the sink.
    ///
    /// Returns `ExporterError::Flush` if any write since `start` failed.
    fn end(self: Box<Self>) -> Result<(), ExporterError>;
}

/// Splits `"label: description"` into its trimmed parts.
///
/// Without a colon the whole string is the description and there is no label.
pub fn split_session_info(session_info: &str) -> (Option<&str>, &str) {
    match session_info.split_once(':') {
        Some((label, description)) => (Some(label.trim()), description.trim()),
        None => (None, session_info.trim()),
    }
}
