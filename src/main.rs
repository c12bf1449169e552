//! pype-demo - streams a synthetic two-channel signal through a sample graph.
//!
//! Usage: `pype-demo [config.toml]`

use anyhow::Context;
use pype_rs::{
    analysis::WindowFunction,
    logging,
    pipeline::nodes::{BufferSink, CollectorSink, Downsample, LowPassFilter, SpectrumNode},
    CircularBuffer, Frame, PipelineBuilder, RuntimeConfig, SharedBuffer,
};
use std::f64::consts::PI;
use std::sync::Arc;

const SAMPLE_RATE: f64 = 1_000.0;
const FRAME_LEN: usize = 256;
const FRAME_COUNT: u64 = 20;
const TONES_HZ: [f64; 2] = [5.0, 40.0];

fn synth_frame(index: u64) -> anyhow::Result<Frame> {
    let offset = index * FRAME_LEN as u64;
    let channels = TONES_HZ
        .iter()
        .map(|&freq| {
            (0..FRAME_LEN as u64)
                .map(|i| (2.0 * PI * freq * (offset + i) as f64 / SAMPLE_RATE).sin())
                .collect()
        })
        .collect();
    Ok(Frame::new(offset, SAMPLE_RATE, channels)?)
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => RuntimeConfig::default(),
    };
    let _log_guard = logging::init(&config.logging)?;

    tracing::info!("Starting pype demo");

    let history = Arc::new(SharedBuffer::new(CircularBuffer::new(
        TONES_HZ.len(),
        4096,
        true,
    )));
    let (ch0, ch0_frames) = CollectorSink::new("ch0");
    let (ch1, ch1_frames) = CollectorSink::new("ch1");
    let (spectra, spectra_frames) = CollectorSink::new("spectra");

    let mut b = PipelineBuilder::<Frame>::with_config(config);
    let src = b.add_passthrough("source");
    let acquire = b.add_async("acquire");
    let lowpass = b.add_stage(LowPassFilter::new("lowpass", 60.0));
    let split = b.add_split("channels");
    let ch0 = b.add_stage(ch0);
    let ch1 = b.add_stage(ch1);
    let decimate = b.add_stage(Downsample::new("decimate", 4));
    let store = b.add_stage(BufferSink::new("history", Arc::clone(&history)));
    let analysis = b.add_async("analysis");
    let fft = b.add_stage(SpectrumNode::new("fft", WindowFunction::Hann));
    let spectra = b.add_stage(spectra);

    b.chain([src, acquire, lowpass])?;
    b.connect(lowpass, [split, decimate, analysis])?;
    b.connect(split, [ch0, ch1])?;
    b.chain([decimate, store])?;
    b.chain([analysis, fft, spectra])?;

    let pipeline = b.build()?;
    let source = pipeline.node(src)?;

    for index in 0..FRAME_COUNT {
        source.write(synth_frame(index)?)?;
    }
    tracing::info!("Queued {} frames, waiting for workers", FRAME_COUNT);
    source.wait()?;

    for failure in pipeline.drain_failures() {
        tracing::error!(
            "{} item #{} failed: {}",
            failure.boundary_name,
            failure.seq,
            failure.error
        );
    }

    println!("Per-channel frames: {} / {}", ch0_frames.len(), ch1_frames.len());
    println!("Decimated samples stored: {}", history.ns_written());
    if let Some(last) = spectra_frames.items().last() {
        for (channel, magnitudes) in last.channels().iter().enumerate() {
            let resolution = SAMPLE_RATE / magnitudes.len().saturating_sub(1).max(1) as f64 / 2.0;
            let peak = magnitudes
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0.0, |(bin, _)| bin as f64 * resolution);
            println!("Channel {} spectral peak: {:.1} Hz", channel, peak);
        }
    }
    for &boundary in pipeline.boundaries() {
        if let Some(stats) = pipeline.boundary_stats(boundary) {
            println!("{}", serde_json::to_string(&stats)?);
        }
    }
    println!("{}", pipeline.topology().to_json()?);

    pipeline.shutdown();
    Ok(())
}
