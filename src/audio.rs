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
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::{error::Error, fmt, sync::Arc};

use crate::config;
use crate::playsync::CancelHandle;

pub mod asset;
pub mod cpal;
pub mod effects;
pub mod mixer;
pub mod mock;
pub mod voice_source;
pub mod wav;

pub use asset::{AssetLoader, AudioAsset, LoadError};
pub use mixer::AudioMixer;

/// Global source ID counter shared by every voice submitted to the mixer.
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new unique source ID.
pub fn next_source_id() -> u64 {
    NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A running output stream. Audio stops when this is dropped.
pub struct OutputStream {
    _stream: Option<::cpal::Stream>,
    /// Stops a software render thread, if there is one.
    render_thread: Option<CancelHandle>,
}

impl OutputStream {
    /// A stream that is rendered by a software thread until the stream is dropped.
    fn software(render_thread: CancelHandle) -> OutputStream {
        OutputStream {
            _stream: None,
            render_thread: Some(render_thread),
        }
    }

    fn cpal(stream: ::cpal::Stream) -> OutputStream {
        OutputStream {
            _stream: Some(stream),
            render_thread: None,
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if let Some(render_thread) = self.render_thread.take() {
            render_thread.cancel();
        }
    }
}

pub trait Device: Any + fmt::Display + std::marker::Send + std::marker::Sync {
    /// Starts rendering the given mixer through the device.
    fn open(&self, mixer: AudioMixer) -> Result<OutputStream, Box<dyn Error>>;

    /// The output sample rate of the device.
    fn sample_rate(&self) -> u32;

    /// The number of output channels the mixer should produce.
    fn channels(&self) -> u16;

    /// Whether the master bus can be recorded while playing through this device.
    fn supports_capture(&self) -> bool;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device described by the audio configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::new(
            device,
            config.sample_rate(),
            config.channels(),
            config.capture(),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
