//! Audio format descriptors and the best-format picker.
//!
//! Everything here is pure: descriptors come in from the extractor's JSON,
//! get normalised, and `choose_best` ranks them deterministically.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::config;

/// Human-readable description of `choose_best`, returned with
/// "no suitable format" errors so a caller can offer a manual choice.
pub const SELECTION_POLICY: &str = "audio-only formats with sample rate >= 44100 Hz; \
prefer opus, then aac/mp4a, then any other codec; within a codec family highest average bitrate first, \
total bitrate as tie-break";

/// One format variant as reported by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    /// `"none"` marks an audio-only variant
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Average audio bitrate, kbit/s
    #[serde(default)]
    pub abr: Option<f64>,
    /// Total bitrate, kbit/s
    #[serde(default)]
    pub tbr: Option<f64>,
    /// Audio sample rate, Hz
    #[serde(default)]
    pub asr: Option<u32>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
}

/// Shape of one entry of the extractor's `formats` array. Numeric fields
/// arrive as ints, floats or null depending on the site.
#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<serde_json::Value>,
    ext: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    tbr: Option<f64>,
    asr: Option<f64>,
    format_note: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl FormatDescriptor {
    /// Builds a descriptor from one raw `formats[]` entry. Entries without
    /// a format id are dropped.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let raw: RawFormat = serde_json::from_value(value.clone()).ok()?;
        let format_id = match raw.format_id? {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self {
            format_id,
            ext: raw.ext,
            acodec: raw.acodec,
            vcodec: raw.vcodec,
            abr: raw.abr,
            tbr: raw.tbr,
            asr: raw.asr.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v.round() as u32),
            format_note: raw.format_note,
            filesize: raw
                .filesize
                .or(raw.filesize_approx)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64),
        })
    }

    /// Lower-cases codec names, and falls back to the total bitrate when
    /// no average bitrate is reported.
    pub fn normalized(mut self) -> Self {
        self.acodec = self.acodec.map(|c| c.trim().to_ascii_lowercase());
        self.vcodec = self.vcodec.map(|c| c.trim().to_ascii_lowercase());
        if self.abr.is_none() {
            self.abr = self.tbr;
        }
        self
    }

    /// True when the descriptor carries an actual audio stream.
    pub fn has_audio(&self) -> bool {
        matches!(self.acodec.as_deref(), Some(codec) if !codec.is_empty() && codec != "none")
    }

    pub fn is_audio_only(&self) -> bool {
        self.vcodec.as_deref() == Some("none")
    }

    /// Audio-only and at least CD sample rate.
    pub fn is_cd_quality(&self) -> bool {
        self.is_audio_only() && self.asr.unwrap_or(0) >= config::download::MIN_SAMPLE_RATE
    }

    fn codec_rank(&self) -> u8 {
        let codec = self.acodec.as_deref().unwrap_or("");
        if codec.starts_with("opus") {
            0
        } else if codec.starts_with("aac") || codec.starts_with("mp4a") {
            1
        } else {
            2
        }
    }
}

/// Normalises raw descriptors and keeps only those with an audio stream.
pub fn audio_formats(formats: impl IntoIterator<Item = FormatDescriptor>) -> Vec<FormatDescriptor> {
    formats
        .into_iter()
        .map(FormatDescriptor::normalized)
        .filter(FormatDescriptor::has_audio)
        .collect()
}

/// True when at least one audio-only descriptor reaches CD sample rate.
pub fn has_cd_quality_audio(formats: &[FormatDescriptor]) -> bool {
    formats
        .iter()
        .cloned()
        .map(FormatDescriptor::normalized)
        .any(|f| f.has_audio() && f.is_cd_quality())
}

fn by_preference(a: &FormatDescriptor, b: &FormatDescriptor) -> Ordering {
    a.codec_rank()
        .cmp(&b.codec_rank())
        .then_with(|| b.abr.unwrap_or(0.0).total_cmp(&a.abr.unwrap_or(0.0)))
        .then_with(|| b.tbr.unwrap_or(0.0).total_cmp(&a.tbr.unwrap_or(0.0)))
}

/// Picks the best audio-only descriptor, or `None` when nothing is
/// audio-only at 44100 Hz or above.
///
/// Ranking: opus, then aac/mp4a, then anything else; inside each family
/// by descending average bitrate, then total bitrate. The sort is stable
/// so equal descriptors keep their input order.
pub fn choose_best(formats: &[FormatDescriptor]) -> Option<FormatDescriptor> {
    let mut tier: Vec<FormatDescriptor> = audio_formats(formats.iter().cloned())
        .into_iter()
        .filter(FormatDescriptor::is_cd_quality)
        .collect();
    tier.sort_by(by_preference);
    tier.into_iter().next()
}
