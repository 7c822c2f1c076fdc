// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio::{wav, AudioAsset};

/// The only format rendered locally.
pub const WAV_FORMAT: &str = "wav";

/// File name used when exporting a cleaned asset.
pub const CLEAN_FILE_NAME: &str = "cleaned-audio.wav";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export denied: {0}")]
    Denied(String),

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] wav::EncodeError),

    #[error("unable to write export: {0}")]
    Io(#[from] std::io::Error),
}

fn default_format() -> String {
    WAV_FORMAT.to_string()
}

/// The answer of an export gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPermission {
    pub allowed: bool,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ExportPermission {
    pub fn allow() -> ExportPermission {
        ExportPermission {
            allowed: true,
            format: default_format(),
            message: None,
        }
    }

    pub fn deny(message: &str) -> ExportPermission {
        ExportPermission {
            allowed: false,
            format: default_format(),
            message: Some(message.to_string()),
        }
    }
}

/// Decides whether an export may happen and in which format.
pub trait ExportGate: Send + Sync {
    fn authorize(&self) -> ExportPermission;
}

/// A gate that always gives the same answer.
#[derive(Clone, Debug)]
pub struct StaticExportGate {
    permission: ExportPermission,
}

impl StaticExportGate {
    pub fn new(permission: ExportPermission) -> StaticExportGate {
        StaticExportGate { permission }
    }
}

impl Default for StaticExportGate {
    fn default() -> Self {
        StaticExportGate::new(ExportPermission::allow())
    }
}

impl ExportGate for StaticExportGate {
    fn authorize(&self) -> ExportPermission {
        self.permission.clone()
    }
}

/// An encoded file, ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Export {
    /// Writes the export into `dir` under its file name.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        info!(path = %path.display(), bytes = self.bytes.len(), "Export written");
        Ok(path)
    }
}

/// File name for a recorded performance.
pub fn performance_file_name(bpm: f64) -> String {
    format!("slicepad_perf_{}bpm.wav", bpm.round())
}

fn check(gate: &dyn ExportGate) -> Result<(), ExportError> {
    let permission = gate.authorize();
    if !permission.allowed {
        let message = permission
            .message
            .unwrap_or_else(|| "export not allowed".to_string());
        warn!(reason = %message, "Export denied");
        return Err(ExportError::Denied(message));
    }
    if !permission.format.eq_ignore_ascii_case(WAV_FORMAT) {
        return Err(ExportError::UnsupportedFormat(permission.format));
    }
    Ok(())
}

/// Encodes interleaved samples as a 16-bit WAV, if the gate allows it.
pub fn export_samples(
    gate: &dyn ExportGate,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
    file_name: &str,
) -> Result<Export, ExportError> {
    check(gate)?;
    Ok(Export {
        file_name: file_name.to_string(),
        bytes: wav::encode_wav(samples, channels, sample_rate)?,
    })
}

/// Encodes a whole asset as a 16-bit WAV, if the gate allows it.
pub fn export_asset(
    gate: &dyn ExportGate,
    asset: &AudioAsset,
    file_name: &str,
) -> Result<Export, ExportError> {
    check(gate)?;
    Ok(Export {
        file_name: file_name.to_string(),
        bytes: wav::encode_asset(asset)?,
    })
}
