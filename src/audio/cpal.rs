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
use std::{error::Error, fmt};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::audio::{mixer::AudioMixer, Device as AudioDevice, OutputStream};
use crate::config;

/// A small wrapper around a cpal::Device with the output format the mixer should render.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The sample format the device prefers.
    sample_format: cpal::SampleFormat,
    /// Output sample rate.
    sample_rate: u32,
    /// Output channels.
    channels: u16,
    /// Whether the master bus may be captured.
    capture: bool,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// f32 callback: the mixer renders straight into the cpal buffer.
fn create_f32_callback(
    mixer: AudioMixer,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        mixer.process_into(data);
    }
}

/// Integer callback: render into a scratch buffer and convert.
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mixer: AudioMixer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        mixer.process_into(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that can produce output.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                if let Some(device) = Device::from_cpal(host_id, device) {
                    devices.push(device);
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Wraps a cpal device using its default output configuration.
    fn from_cpal(host_id: cpal::HostId, device: cpal::Device) -> Option<Device> {
        let max_channels = device
            .supported_output_configs()
            .ok()?
            .map(|output_config| output_config.channels())
            .max()?;
        let default_config = device.default_output_config().ok()?;
        #[allow(deprecated)]
        let name = device.name().ok()?;

        Some(Device {
            name,
            max_channels,
            host_id,
            sample_format: default_config.sample_format(),
            sample_rate: default_config.sample_rate(),
            channels: default_config.channels(),
            device,
            capture: false,
        })
    }

    /// Gets the given cpal device. "default" selects the default output of the default host.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        let device = if name == "default" {
            let host = cpal::default_host();
            host.default_output_device()
                .and_then(|device| Device::from_cpal(host.id(), device))
        } else {
            Device::list_cpal_devices()?
                .into_iter()
                .find(|device| device.name.trim() == name)
        };

        match device {
            Some(mut device) => {
                device.channels = config.channels().clamp(1, device.max_channels.max(1));
                device.capture = config.capture();
                info!(
                    device = device.name,
                    sample_rate = device.sample_rate,
                    channels = device.channels,
                    "Using cpal output device"
                );
                Ok(device)
            }
            None => Err(format!("no device found with name {}", name).into()),
        }
    }
}

impl AudioDevice for Device {
    fn open(&self, mixer: AudioMixer) -> Result<OutputStream, Box<dyn Error>> {
        let stream_config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let err_fn = |err| error!("CPAL output stream error: {}", err);

        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.device.build_output_stream(
                &stream_config,
                create_f32_callback(mixer),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => self.device.build_output_stream(
                &stream_config,
                create_converting_callback::<i16>(mixer),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I32 => self.device.build_output_stream(
                &stream_config,
                create_converting_callback::<i32>(mixer),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::U16 => self.device.build_output_stream(
                &stream_config,
                create_converting_callback::<u16>(mixer),
                err_fn,
                None,
            )?,
            format => return Err(format!("unsupported sample format {}", format).into()),
        };
        stream.play()?;
        info!(device = self.name, "CPAL output stream started");

        Ok(OutputStream::cpal(stream))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn supports_capture(&self) -> bool {
        self.capture
    }
}
