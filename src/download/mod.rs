//! Extractor, encoder and archiver plumbing

pub mod convert;
pub mod error;
pub mod export;
pub mod extract;
pub mod failure;
pub mod formats;
pub mod probe;
pub mod progress;

// Re-exports for convenience
pub use error::ProbeError;
pub use extract::{AudioExtractor, ExtractRequest, ExtractedAudio, YtDlpExtractor};
pub use formats::{choose_best, FormatDescriptor};
pub use probe::{MetadataSource, ProbeMode, ProbeResult, Prober, YtDlpMetadataSource};
