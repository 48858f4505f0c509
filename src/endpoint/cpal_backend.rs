//! Hardware endpoints through cpal.
//!
//! cpal drives devices with callbacks on its own audio thread, while the
//! pump wants a pull/push buffer interface. Each endpoint bridges the two
//! with a lock-free SPSC ring of normalized f32 samples: the capture
//! callback pushes (dropping on overflow, never blocking) and the render
//! callback pops (filling underruns with silence).

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SizedSample, Stream, StreamConfig as CpalStreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{Direction, Endpoint, EndpointBackend, EndpointId, EndpointInfo};
use crate::config::PumpConfig;
use crate::format::{
    decode_into, f32_to_i16, f32_to_i32, from_float, i16_to_f32, i32_to_f32, NativeFormat,
    SampleFormat,
};
use crate::RouteError;

/// Ring buffers never go below this many frames, whatever the latency profile.
const MIN_RING_FRAMES: usize = 1024;

/// Endpoints backed by the default cpal host.
///
/// Device names double as endpoint ids. Application sessions are not
/// exposed by cpal, so app routes are unavailable with this backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl CpalBackend {
    /// Creates a backend on the default host.
    pub fn new() -> Self {
        Self
    }

    fn devices(direction: Direction) -> Result<Vec<Device>, RouteError> {
        let host = cpal::default_host();
        let devices = match direction {
            Direction::Capture => host.input_devices(),
            Direction::Render => host.output_devices(),
        }
        .map_err(|e| RouteError::device(&EndpointId::new(host.id().name()), e.to_string()))?;
        Ok(devices.collect())
    }

    fn find_device(id: &EndpointId, direction: Direction) -> Result<Device, RouteError> {
        Self::devices(direction)?
            .into_iter()
            .find(|device| device.name().is_ok_and(|name| name == id.as_str()))
            .ok_or_else(|| RouteError::device(id, format!("no {direction} device with this name")))
    }
}

impl EndpointBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_endpoints(&self, direction: Direction) -> Result<Vec<EndpointInfo>, RouteError> {
        Ok(Self::devices(direction)?
            .iter()
            .filter_map(|device| device.name().ok())
            .map(|name| EndpointInfo::new(name.clone(), name))
            .collect())
    }

    fn default_endpoint(&self, direction: Direction) -> Option<EndpointId> {
        let host = cpal::default_host();
        let device = match direction {
            Direction::Capture => host.default_input_device(),
            Direction::Render => host.default_output_device(),
        }?;
        device.name().ok().map(EndpointId::from)
    }

    fn open(
        &self,
        id: &EndpointId,
        direction: Direction,
        config: &PumpConfig,
    ) -> Result<Box<dyn Endpoint>, RouteError> {
        let device = Self::find_device(id, direction)?;
        let supported = match direction {
            Direction::Capture => device.default_input_config(),
            Direction::Render => device.default_output_config(),
        }
        .map_err(|e| RouteError::device(id, e.to_string()))?;

        let sample_format = supported.sample_format();
        let stream_config: CpalStreamConfig = supported.into();
        let format = NativeFormat::new(
            stream_config.sample_rate.0,
            stream_config.channels,
            SampleFormat::F32,
        );
        let frames = config.buffer_frames(format.sample_rate).max(MIN_RING_FRAMES);
        let (producer, consumer) =
            HeapRb::<f32>::new(frames * usize::from(format.channels)).split();

        let build_err = |e: cpal::BuildStreamError| RouteError::device(id, e.to_string());
        let endpoint: Box<dyn Endpoint> = match direction {
            Direction::Capture => {
                let stream = match sample_format {
                    cpal::SampleFormat::F32 => {
                        build_capture::<f32>(&device, &stream_config, producer, |s| s)
                    }
                    cpal::SampleFormat::I16 => {
                        build_capture::<i16>(&device, &stream_config, producer, i16_to_f32)
                    }
                    cpal::SampleFormat::I32 => {
                        build_capture::<i32>(&device, &stream_config, producer, i32_to_f32)
                    }
                    other => return Err(unsupported(id, other)),
                }
                .map_err(build_err)?;
                Box::new(CpalCapture {
                    id: id.clone(),
                    format,
                    stream: Some(stream),
                    consumer,
                    samples: Vec::new(),
                })
            }
            Direction::Render => {
                let stream = match sample_format {
                    cpal::SampleFormat::F32 => {
                        build_render::<f32>(&device, &stream_config, consumer, |s| s)
                    }
                    cpal::SampleFormat::I16 => {
                        build_render::<i16>(&device, &stream_config, consumer, f32_to_i16)
                    }
                    cpal::SampleFormat::I32 => {
                        build_render::<i32>(&device, &stream_config, consumer, f32_to_i32)
                    }
                    other => return Err(unsupported(id, other)),
                }
                .map_err(build_err)?;
                Box::new(CpalRender {
                    id: id.clone(),
                    format,
                    stream: Some(stream),
                    producer,
                    scratch: Vec::new(),
                    samples: Vec::new(),
                })
            }
        };

        tracing::debug!(
            endpoint = %id,
            %direction,
            sample_rate = format.sample_rate,
            channels = format.channels,
            device_format = ?sample_format,
            "cpal endpoint opened"
        );
        Ok(endpoint)
    }
}

fn build_capture<T: SizedSample>(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: HeapProd<f32>,
    convert: fn(T) -> f32,
) -> Result<Stream, cpal::BuildStreamError> {
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Non-blocking push - drops samples if the pump falls behind
            for &sample in data {
                let _ = producer.try_push(convert(sample));
            }
        },
        |err| {
            tracing::error!("capture stream error: {}", err);
        },
        None,
    )
}

fn build_render<T: SizedSample>(
    device: &Device,
    config: &CpalStreamConfig,
    mut consumer: HeapCons<f32>,
    convert: fn(f32) -> T,
) -> Result<Stream, cpal::BuildStreamError> {
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for slot in data.iter_mut() {
                *slot = convert(consumer.try_pop().unwrap_or(0.0));
            }
        },
        |err| {
            tracing::error!("render stream error: {}", err);
        },
        None,
    )
}

fn unsupported(id: &EndpointId, format: cpal::SampleFormat) -> RouteError {
    RouteError::device(id, format!("unsupported sample format {format:?}"))
}

fn play(id: &EndpointId, stream: Option<&Stream>) -> Result<(), RouteError> {
    let stream = stream.ok_or_else(|| RouteError::device(id, "stream already closed"))?;
    stream.play().map_err(|e| RouteError::device(id, e.to_string()))
}

fn pause(id: &EndpointId, stream: Option<&Stream>) -> Result<(), RouteError> {
    match stream {
        Some(stream) => stream.pause().map_err(|e| RouteError::device(id, e.to_string())),
        None => Ok(()),
    }
}

struct CpalCapture {
    id: EndpointId,
    format: NativeFormat,
    stream: Option<Stream>,
    consumer: HeapCons<f32>,
    samples: Vec<f32>,
}

impl Endpoint for CpalCapture {
    fn id(&self) -> &EndpointId {
        &self.id
    }

    fn direction(&self) -> Direction {
        Direction::Capture
    }

    fn native_format(&self) -> NativeFormat {
        self.format
    }

    fn buffer_frames(&self) -> usize {
        self.consumer.capacity().get() / usize::from(self.format.channels)
    }

    fn available_frames(&mut self) -> Result<usize, RouteError> {
        Ok(self.consumer.occupied_len() / usize::from(self.format.channels))
    }

    fn read_frames(&mut self, max_frames: usize, out: &mut Vec<u8>) -> Result<usize, RouteError> {
        let channels = usize::from(self.format.channels);
        let frames = self.available_frames()?.min(max_frames);
        self.samples.clear();
        self.samples.resize(frames * channels, 0.0);
        let popped = self.consumer.pop_slice(&mut self.samples);

        out.clear();
        out.resize(popped * SampleFormat::F32.bytes_per_sample(), 0);
        from_float(&self.samples[..popped], SampleFormat::F32, out);
        Ok(popped / channels)
    }

    fn acquire_write_buffer(&mut self, _frames: usize) -> Result<&mut [u8], RouteError> {
        Err(RouteError::device(&self.id, "capture endpoint is read-only"))
    }

    fn release_write_buffer(&mut self, _frames: usize) -> Result<(), RouteError> {
        Err(RouteError::device(&self.id, "capture endpoint is read-only"))
    }

    fn start(&mut self) -> Result<(), RouteError> {
        play(&self.id, self.stream.as_ref())
    }

    fn stop(&mut self) -> Result<(), RouteError> {
        pause(&self.id, self.stream.as_ref())
    }

    fn close(&mut self) {
        // Dropping the stream releases the device
        self.stream.take();
    }
}

struct CpalRender {
    id: EndpointId,
    format: NativeFormat,
    stream: Option<Stream>,
    producer: HeapProd<f32>,
    scratch: Vec<u8>,
    samples: Vec<f32>,
}

impl Endpoint for CpalRender {
    fn id(&self) -> &EndpointId {
        &self.id
    }

    fn direction(&self) -> Direction {
        Direction::Render
    }

    fn native_format(&self) -> NativeFormat {
        self.format
    }

    fn buffer_frames(&self) -> usize {
        self.producer.capacity().get() / usize::from(self.format.channels)
    }

    fn available_frames(&mut self) -> Result<usize, RouteError> {
        Ok(self.producer.vacant_len() / usize::from(self.format.channels))
    }

    fn read_frames(&mut self, _max_frames: usize, _out: &mut Vec<u8>) -> Result<usize, RouteError> {
        Err(RouteError::device(&self.id, "render endpoint is write-only"))
    }

    fn acquire_write_buffer(&mut self, frames: usize) -> Result<&mut [u8], RouteError> {
        if self.stream.is_none() {
            return Err(RouteError::device(&self.id, "stream already closed"));
        }
        self.scratch.clear();
        self.scratch.resize(frames * self.format.bytes_per_frame(), 0);
        Ok(&mut self.scratch)
    }

    fn release_write_buffer(&mut self, frames: usize) -> Result<(), RouteError> {
        let bytes = (frames * self.format.bytes_per_frame()).min(self.scratch.len());
        self.samples.clear();
        decode_into(&self.scratch[..bytes], SampleFormat::F32, &mut self.samples);
        let pushed = self.producer.push_slice(&self.samples);
        if pushed < self.samples.len() {
            tracing::trace!(
                endpoint = %self.id,
                dropped = self.samples.len() - pushed,
                "render ring full"
            );
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), RouteError> {
        play(&self.id, self.stream.as_ref())
    }

    fn stop(&mut self) -> Result<(), RouteError> {
        pause(&self.id, self.stream.as_ref())
    }

    fn close(&mut self) {
        self.stream.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_list_output_devices() {
        let backend = CpalBackend::new();
        let outputs = backend.list_endpoints(Direction::Render).unwrap();
        for info in &outputs {
            println!("{}", info.display_name);
        }
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_output() {
        let backend = CpalBackend::new();
        let Some(id) = backend.default_endpoint(Direction::Render) else {
            return;
        };
        let mut endpoint = backend
            .open(&id, Direction::Render, &PumpConfig::default())
            .unwrap();
        assert!(endpoint.available_frames().unwrap() > 0);
        endpoint.close();
    }
}
