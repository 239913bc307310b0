//! Scoped ingestion of uploaded audio.
//!
//! Uploaded audio is written to a uniquely named temporary file whose lifetime
//! is bound to a [`ScopedAudio`] handle. Dropping the handle unlinks the file,
//! so every exit path of a pipeline run (success, transcription failure,
//! downstream cancellation, panic unwinding) releases it.
//!
//! Only shallow checks happen here: the payload must be non-empty, within the
//! configured size limit, and declare a supported container. Deep validation of
//! the audio itself is left to the ASR service.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

/// Default maximum accepted upload (10 MiB).
pub const DEFAULT_MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Container assumed when the upload does not declare one.
pub const DEFAULT_AUDIO_FORMAT: AudioFormat = AudioFormat::Wav;

/// Errors raised while accepting an upload.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Audio payload is empty")]
    Empty,

    #[error("Audio payload ({size} bytes) exceeds maximum size ({max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to persist audio payload: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio containers accepted by the ingestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Pcm,
    Mp3,
    Aac,
    Amr,
    Ogg,
    Webm,
    M4a,
}

impl AudioFormat {
    /// Value sent as the `format` field of the ASR request, also used as the
    /// temp file extension.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Pcm => "pcm",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Amr => "amr",
            Self::Ogg => "ogg",
            Self::Webm => "webm",
            Self::M4a => "m4a",
        }
    }

    /// Parse a declared format hint.
    ///
    /// Accepts a bare extension (`wav`), a MIME type (`audio/x-wav`,
    /// `audio/webm;codecs=opus`) or a filename (`clip.MP3`).
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().to_ascii_lowercase();
        let hint = hint.split(';').next().unwrap_or_default().trim();

        let token = if let Some(subtype) = hint.strip_prefix("audio/") {
            subtype
        } else if let Some((_, ext)) = hint.rsplit_once('.') {
            ext
        } else {
            hint
        };

        match token.trim_start_matches("x-") {
            "wav" | "wave" | "vnd.wave" => Some(Self::Wav),
            "pcm" | "l16" | "raw" => Some(Self::Pcm),
            "mp3" | "mpeg" | "mpeg3" => Some(Self::Mp3),
            "aac" => Some(Self::Aac),
            "amr" => Some(Self::Amr),
            "ogg" | "opus" => Some(Self::Ogg),
            "webm" => Some(Self::Webm),
            "m4a" | "mp4" => Some(Self::M4a),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Header information read from a WAV upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl std::fmt::Display for AudioInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {} channel(s), {}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Handle to an ingested upload.
///
/// Owns the temporary file; the file is removed when the handle is dropped.
#[derive(Debug)]
pub struct ScopedAudio {
    file: NamedTempFile,
    format: AudioFormat,
    size: usize,
    info: Option<AudioInfo>,
}

impl ScopedAudio {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// WAV header details, when the payload header could be read.
    pub fn info(&self) -> Option<AudioInfo> {
        self.info
    }
}

/// Writes uploads into scoped temporary files.
#[derive(Debug, Clone)]
pub struct AudioIngestor {
    max_bytes: usize,
    temp_dir: Option<PathBuf>,
}

impl Default for AudioIngestor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AUDIO_BYTES, None)
    }
}

impl AudioIngestor {
    pub fn new(max_bytes: usize, temp_dir: Option<PathBuf>) -> Self {
        Self {
            max_bytes,
            temp_dir,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validate and persist an upload.
    ///
    /// This performs blocking file I/O; async callers should run it on the
    /// blocking pool (see [`AudioIngestor::ingest_blocking`]).
    pub fn ingest(
        &self,
        payload: &[u8],
        declared_format: Option<&str>,
    ) -> Result<ScopedAudio, IngestError> {
        if payload.is_empty() {
            return Err(IngestError::Empty);
        }
        if payload.len() > self.max_bytes {
            return Err(IngestError::TooLarge {
                size: payload.len(),
                max: self.max_bytes,
            });
        }

        let format = match declared_format.map(str::trim).filter(|s| !s.is_empty()) {
            Some(hint) => AudioFormat::from_hint(hint)
                .ok_or_else(|| IngestError::UnsupportedFormat(hint.to_string()))?,
            None => DEFAULT_AUDIO_FORMAT,
        };

        let suffix = format!(".{}", format.as_str());
        let mut builder = tempfile::Builder::new();
        builder.prefix("audio_").suffix(&suffix);
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(payload)?;
        file.flush()?;

        let info = match format {
            AudioFormat::Wav => read_wav_header(file.path()),
            _ => None,
        };

        info!(
            size = payload.len(),
            format = %format,
            header_read = info.is_some(),
            "Audio payload ingested"
        );
        if let Some(info) = info {
            debug!("Audio header: {}", info);
        }

        Ok(ScopedAudio {
            file,
            format,
            size: payload.len(),
            info,
        })
    }

    /// Run [`AudioIngestor::ingest`] on the blocking thread pool.
    pub async fn ingest_blocking(
        &self,
        payload: Bytes,
        declared_format: Option<String>,
    ) -> Result<ScopedAudio, IngestError> {
        let ingestor = self.clone();
        tokio::task::spawn_blocking(move || ingestor.ingest(&payload, declared_format.as_deref()))
            .await
            .map_err(|e| IngestError::Io(std::io::Error::other(e)))?
    }
}

/// Read the RIFF header of a WAV file. Returns `None` when it is not parseable.
fn read_wav_header(path: &Path) -> Option<AudioInfo> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    Some(AudioInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
    })
}
