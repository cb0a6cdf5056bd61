//! Error types for plugin loading.
//!
//! Every failure mode of a load attempt is a `LoadError` variant. The `Display`
//! implementation supplies the human-readable diagnostic the host reports; the
//! `severity` accessor tells the host whether the condition is fatal to the
//! load or merely worth a warning.

use thiserror::Error;

/// How serious a load diagnostic is, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The plugin loaded, but part of it is unusable (e.g. no entry symbol).
    Warning,
    /// The load attempt failed and was fully unwound.
    Fatal,
}

/// Error type for a plugin load attempt.
///
/// None of these are retried automatically; the host decides whether to skip
/// the plugin, warn the user, or treat the failure as fatal to startup.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Runtime memory for a segment could not be obtained.
    #[error("cannot allocate {size} bytes for {what}: {source}")]
    AllocationFailure {
        what: &'static str,
        size: usize,
        #[source]
        source: std::io::Error,
    },

    /// A declared file range extends past the end of the object stream.
    #[error("truncated read of {what}: need {need} bytes at offset {offset:#x}, only {have} available")]
    TruncatedRead {
        what: &'static str,
        offset: u64,
        need: u64,
        have: u64,
    },

    /// Bad offsets, sizes, or indices in the section table, or a relocation
    /// target falling outside its segment.
    #[error("malformed section table: {0}")]
    MalformedSectionTable(String),

    /// A qualifying relocation section uses the addend-carrying encoding,
    /// which this loader rejects rather than misreads.
    #[error("relocation section {section} carries explicit addends, which are not supported")]
    UnsupportedRelocationSectionFormat { section: usize },

    /// A relocation entry uses a type code outside the architecture's table.
    #[error("unknown relocation type {rel_type} for machine {machine:#x}")]
    UnsupportedRelocationType { rel_type: u32, machine: u16 },

    /// An undefined symbol was not found in the host export table.
    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// The object header does not describe a loadable target (bad magic,
    /// word size, endianness, or machine).
    #[error("unsupported object: {0}")]
    UnsupportedObject(String),

    /// The designated registration symbol is absent from the loaded plugin.
    #[error("entry symbol `{0}` not found in plugin")]
    EntrySymbolMissing(String),

    /// The object stream itself could not be acquired.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// Severity of this diagnostic. A missing entry symbol leaves the plugin
    /// loaded and relocated; everything else aborts the load.
    pub fn severity(&self) -> Severity {
        match self {
            LoadError::EntrySymbolMissing(_) => Severity::Warning,
            _ => Severity::Fatal,
        }
    }
}
