use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result delivered when a session drains and tears down cleanly.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    /// The finished ADTS stream.
    pub file_path: PathBuf,
    /// Raw PCM mirror, when enabled in the configuration.
    pub debug_raw_path: Option<PathBuf>,
    /// Audio duration derived from the captured PCM byte count.
    pub duration_secs: f64,
    /// SHA-256 hex digest of the encoded file.
    pub checksum: String,
    pub stats: SessionStats,
    pub metadata: RecordingMetadata,
}

/// Counters collected by the capture and encode loops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub chunks_captured: u64,
    pub bytes_captured: u64,
    pub chunks_encoded: u64,
    pub packets_written: u64,
    /// Encoded bytes written, ADTS headers included.
    pub bytes_written: u64,
}

/// Metadata stored alongside a recording as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub format: String,
    pub file_path: String,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
    pub packet_count: u64,
    pub checksum: String,
    pub created_at: String,
}

impl RecordingMetadata {
    /// Creates metadata for an ADTS-framed AAC recording.
    pub fn new_adts(
        file_path: &str,
        duration_secs: f64,
        sample_rate: u32,
        channels: u16,
        bit_rate: u32,
        packet_count: u64,
        checksum: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            format: "audio/aac".to_string(),
            file_path: file_path.to_string(),
            duration_secs,
            sample_rate,
            channels,
            bit_rate,
            packet_count,
            checksum: checksum.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
