//! Audio input.
//! A cpal input stream on the default device pushes mono f32 chunks into a
//! channel; `record` discards anything buffered and blocks until a fresh block
//! of the requested length has arrived. Devices are opened in a format they
//! support and downmixed to mono in the callback.

use anyhow::{anyhow, bail, Context, Result};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfig, SupportedStreamConfigRange};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use tracing::{error, info, warn};

/// Blocking source of mono sample blocks.
pub trait AudioSource {
    fn record(&mut self, sample_count: usize) -> Result<Vec<f32>>;
}

pub struct MicrophoneSource {
    // Capture stops when the stream is dropped.
    _stream: cpal::Stream,
    chunks: Receiver<Vec<f32>>,
    sample_rate: u32,
}

impl MicrophoneSource {
    /// Opens the default input at `sample_rate` when the device supports it,
    /// otherwise at the device's own rate. Check `sample_rate()` afterwards.
    pub fn open_default(sample_rate: u32) -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No audio input device available"))?;
        let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());

        let supported = device
            .supported_input_configs()
            .with_context(|| format!("Failed to query input formats of '{name}'"))?;
        let chosen = match pick_config(supported, sample_rate) {
            Some(config) => config,
            None => {
                let fallback = device
                    .default_input_config()
                    .with_context(|| format!("No usable input format on '{name}'"))?;
                warn!(
                    requested = sample_rate,
                    device_rate = fallback.sample_rate().0,
                    "requested sample rate not supported, using the device rate"
                );
                fallback
            }
        };

        let rate = chosen.sample_rate().0;
        let channels = chosen.channels();
        let format = chosen.sample_format();
        let stream_config: cpal::StreamConfig = chosen.into();

        let (tx, chunks) = mpsc::channel();
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, tx),
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, tx),
            SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, tx),
            SampleFormat::I8 => build_stream::<i8>(&device, &stream_config, tx),
            other => bail!("Unsupported sample format {other:?} on '{name}'"),
        }
        .with_context(|| format!("Failed to open {channels}ch {rate} Hz {format:?} input on '{name}'"))?;
        stream.play().context("Failed to start audio stream")?;

        info!(device = %name, sample_rate = rate, channels, format = ?format, "audio capture stream started");
        Ok(Self {
            _stream: stream,
            chunks,
            sample_rate: rate,
        })
    }

    /// Rate the stream actually runs at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: Sender<Vec<f32>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let channels = config.channels as usize;
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
            // Receiver gone means the source was dropped.
            let _ = tx.send(downmix(&samples, channels));
        },
        |err| {
            error!(error = %err, "audio capture error");
        },
        None,
    )
}

/// Input format covering `sample_rate`: f32 first, then fewest channels.
fn pick_config(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<SupportedStreamConfig> {
    ranges
        .into_iter()
        .filter(|r| {
            r.min_sample_rate().0 <= sample_rate
                && sample_rate <= r.max_sample_rate().0
                && is_convertible(r.sample_format())
        })
        .min_by_key(|r| (r.sample_format() != SampleFormat::F32, r.channels()))
        .map(|r| r.with_sample_rate(cpal::SampleRate(sample_rate)))
}

fn is_convertible(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16 | SampleFormat::I32 | SampleFormat::I8
    )
}

/// Averages interleaved frames into one channel.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

impl AudioSource for MicrophoneSource {
    fn record(&mut self, sample_count: usize) -> Result<Vec<f32>> {
        collect_block(&self.chunks, sample_count)
    }
}

/// Drops stale chunks, then gathers exactly `sample_count` new samples.
fn collect_block(chunks: &Receiver<Vec<f32>>, sample_count: usize) -> Result<Vec<f32>> {
    loop {
        match chunks.try_recv() {
            Ok(_) => continue,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => return Err(anyhow!("Audio stream closed")),
        }
    }

    let mut block = Vec::with_capacity(sample_count);
    while block.len() < sample_count {
        let chunk = chunks.recv().context("Audio stream closed while recording")?;
        block.extend_from_slice(&chunk);
    }
    block.truncate(sample_count);
    Ok(block)
}
