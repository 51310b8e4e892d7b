use std::collections::BTreeSet;
use std::io::{self, Write};

use thiserror::Error;

use quarry_store_core::StorePath;

/// Announces the destination of the NAR that was just streamed, plus
/// the references the endpoint should record for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTrailer {
    pub store_path: StorePath,
    pub references: BTreeSet<StorePath>,
}

/// The seam to the store's import endpoint.
///
/// The endpoint is a collaborator, not part of this crate's logic: it
/// consumes a framed NAR stream and materializes objects. The pipeline
/// only needs to open connections on demand.
pub trait Importer {
    type Conn: ImportConn;

    fn start_import(&self) -> Result<Self::Conn, ImportError>;
}

/// One in-flight import.
///
/// NAR bytes are streamed through the [`Write`] impl, then
/// [`trailer`] names the destination. Dropping the connection without
/// a trailer aborts the import; the endpoint discards what it received
/// and no partial state survives.
///
/// [`trailer`]: ImportConn::trailer
pub trait ImportConn: Write {
    /// Sends the trailer. The endpoint validates and acts on the
    /// object here; an error means the import was refused.
    fn trailer(&mut self, trailer: &ExportTrailer) -> Result<(), ImportError>;

    /// Completes the stream.
    fn finish(self) -> Result<(), ImportError>;
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("import endpoint rejected {path}: {reason}")]
    Rejected { path: String, reason: String },

    #[error("restore {path}: {source}")]
    Restore {
        path: String,
        #[source]
        source: quarry_nar::NarError,
    },
}
