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
use std::path::PathBuf;

use serde::Deserialize;

use crate::export::{ExportPermission, StaticExportGate, WAV_FORMAT};

/// A YAML representation of the export settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Export {
    /// Whether exports are allowed (default: true).
    allowed: Option<bool>,

    /// Export format (default: "wav").
    format: Option<String>,

    /// Message shown when exports are denied.
    message: Option<String>,

    /// Where exports are written (default: the working directory).
    directory: Option<String>,
}

impl Export {
    pub fn permission(&self) -> ExportPermission {
        ExportPermission {
            allowed: self.allowed.unwrap_or(true),
            format: self
                .format
                .clone()
                .unwrap_or_else(|| WAV_FORMAT.to_string()),
            message: self.message.clone(),
        }
    }

    /// A gate that answers with the configured permission.
    pub fn gate(&self) -> StaticExportGate {
        StaticExportGate::new(self.permission())
    }

    pub fn directory(&self) -> PathBuf {
        PathBuf::from(self.directory.as_deref().unwrap_or("."))
    }
}
