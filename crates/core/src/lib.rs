//! Scanlate Core Library
//!
//! Document engine for comic scanlation projects: the XML container codec,
//! undo history, OCR merging, profile-aware search, flat text exchange and
//! the editing session tying them together.

pub mod cancel;
pub mod codec;
pub mod config;
pub mod flat_text;
pub mod history;
pub mod ocr;
pub mod search;
pub mod session;
pub mod sync;
pub mod translation;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use codec::{decode, encode, DecodeError, EncodeError, FORMAT_VERSION};
pub use config::{EngineConfig, HistoryConfig, MergeConfig};
pub use flat_text::{
    export_text, import_text, ExportError, FlatExportConfig, ImportError, ImportReport,
};
pub use history::{Change, Command, History, HistoryError, RegionEdit};
pub use ocr::{
    CollaboratorError, Detection, OcrCollaborator, OcrConfig, OcrRequest, OcrTicket, RecordedOcr,
};
pub use search::{Match, Matches, ProfileScope, SearchError, SearchQuery, SearchScope};
pub use session::{Session, SessionError, SessionResult};
pub use sync::{ConflictReason, MergeReport, SoftConflict, SyncEngine, SyncError};
pub use translation::{
    TranslationCollaborator, TranslationError, TranslationReport, TranslationRequest,
};
