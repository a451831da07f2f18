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
use std::{
    error::Error,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info};

use crate::audio::render::Renderer;
use crate::audio::voice::{Voice, VoiceHandle};
use crate::audio::{Device as AudioDevice, DeviceError};

/// A small wrapper around a cpal::Device. The actual stream lives on a
/// dedicated thread because cpal streams cannot move between threads; this
/// wrapper talks to it over channels.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The output sample rate of the default stream config.
    sample_rate: u32,
    /// The channel count of the default stream config.
    channels: u16,
    /// The sample format of the default stream config.
    sample_format: cpal::SampleFormat,
    /// Frames rendered so far. The device clock derives from this, so it
    /// only moves while a stream is running.
    frames: Arc<AtomicU64>,
    /// Voice submissions, drained by the renderer inside the stream callback.
    voice_tx: Sender<Voice>,
    voice_rx: Receiver<Voice>,
    /// The running stream thread, if any.
    stream: Mutex<Option<StreamThread>>,
}

enum StreamCommand {
    Shutdown,
}

struct StreamThread {
    command_tx: Sender<StreamCommand>,
    join_handle: thread::JoinHandle<()>,
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

/// Builds a data callback that renders f32 and converts to the stream's
/// sample type.
fn create_callback<T>(
    mut renderer: Renderer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        renderer.process(&mut scratch);
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

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
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
                let mut max_channels = 0;
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };
                for output_config in output_configs {
                    if max_channels < output_config.channels() {
                        max_channels = output_config.channels();
                    }
                }

                // A default output config is required for playback.
                let default_config = match device.default_output_config() {
                    Ok(default_config) => default_config,
                    Err(_) => continue,
                };

                if max_channels > 0 {
                    let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        sample_rate: default_config.sample_rate(),
                        channels: default_config.channels(),
                        sample_format: default_config.sample_format(),
                        device,
                        frames: Arc::new(AtomicU64::new(0)),
                        voice_tx,
                        voice_rx,
                        stream: Mutex::new(None),
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device.
    pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
        match Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
        {
            Some(device) => Ok(device),
            None => Err(format!("no device found with name {}", name).into()),
        }
    }
}

impl AudioDevice for Device {
    fn now(&self) -> f64 {
        self.frames.load(Ordering::Relaxed) as f64 / f64::from(self.sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Builds the output stream on a dedicated thread and blocks until it is
    /// playing or has failed.
    fn resume(&self) -> Result<(), DeviceError> {
        let mut stream = self.stream.lock();
        if stream.is_some() {
            return Ok(());
        }

        let renderer = Renderer::new(
            self.sample_rate,
            self.channels,
            Arc::clone(&self.frames),
            self.voice_rx.clone(),
        );
        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let sample_format = self.sample_format;
        let device = self.device.clone();

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        // The stream is not Send, so it must be created and held on the
        // thread that owns it.
        let join_handle = thread::spawn(move || {
            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => {
                    let mut callback = create_callback::<f32>(renderer);
                    device.build_output_stream(
                        &config,
                        move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                            callback(data, info);
                        },
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    )
                }
                cpal::SampleFormat::I16 => {
                    let mut callback = create_callback::<i16>(renderer);
                    device.build_output_stream(
                        &config,
                        move |data: &mut [i16], info: &cpal::OutputCallbackInfo| {
                            callback(data, info);
                        },
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    )
                }
                cpal::SampleFormat::I32 => {
                    let mut callback = create_callback::<i32>(renderer);
                    device.build_output_stream(
                        &config,
                        move |data: &mut [i32], info: &cpal::OutputCallbackInfo| {
                            callback(data, info);
                        },
                        |err| error!("CPAL output stream error: {}", err),
                        None,
                    )
                }
                other => {
                    let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", other)));
                    return;
                }
            };

            let stream = match stream_result {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Hold the stream until shutdown.
            loop {
                match command_rx.recv() {
                    Ok(StreamCommand::Shutdown) | Err(_) => break,
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    device = self.name,
                    sample_rate = self.sample_rate,
                    channels = self.channels,
                    "Audio stream running."
                );
                *stream = Some(StreamThread {
                    command_tx,
                    join_handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join_handle.join();
                Err(DeviceError::Resume(e))
            }
            Err(e) => {
                let _ = join_handle.join();
                Err(DeviceError::Resume(e.to_string()))
            }
        }
    }

    fn suspend(&self) {
        let stream = self.stream.lock().take();
        if let Some(stream) = stream {
            let _ = stream.command_tx.send(StreamCommand::Shutdown);
            let _ = stream.join_handle.join();
            info!(device = self.name, "Audio stream stopped.");
        }
    }

    fn submit(&self, voice: Voice) -> Result<VoiceHandle, DeviceError> {
        if self.stream.lock().is_none() {
            return Err(DeviceError::Stream(format!(
                "device {} is suspended",
                self.name
            )));
        }

        let handle = voice.handle();
        self.voice_tx
            .send(voice)
            .map_err(|e| DeviceError::Stream(e.to_string()))?;
        Ok(handle)
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, DeviceError> {
        Err(DeviceError::Unavailable("not a mock".to_string()))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.suspend();
    }
}
