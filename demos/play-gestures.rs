//! An example showcasing how to drive the grain engine from simulated touch gestures and an
//! automated arpeggio voice, draining the scheduled grains from a renderer thread.

use std::{
    f32::consts::PI,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use grainflow::{
    ArpConfig, ArpPlayback, Engine, EngineOptions, Error, GestureMapping, GestureState,
    ParamUpdate, QueueSink, SampleBuffer, ScalePreset, SinkEvent, SystemTimeSource, VoiceId,
};

// -------------------------------------------------------------------------------------------------

const SAMPLE_RATE: u32 = 48000;

fn sine_sweep(seconds: f32) -> Result<SampleBuffer, Error> {
    let frames = (seconds * SAMPLE_RATE as f32) as usize;
    let mut phase = 0.0_f32;
    let samples = (0..frames)
        .map(|frame| {
            let frequency = 110.0 + 330.0 * frame as f32 / frames as f32;
            phase = (phase + 2.0 * PI * frequency / SAMPLE_RATE as f32) % (2.0 * PI);
            phase.sin() * 0.5
        })
        .collect();
    SampleBuffer::from_mono(samples, SAMPLE_RATE)
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    simple_logger::init_with_level(log::Level::Info).unwrap_or_default();

    // Create an engine which pushes all grain events into a lock-free queue
    let sink = QueueSink::default();
    let queue = sink.queue();
    let mut engine = Engine::new(
        EngineOptions::default().voices(8),
        sink,
        Arc::new(SystemTimeSource::new()),
    )?;
    engine.load_buffer(Arc::new(sine_sweep(4.0)?));

    // Drain the queue from a "renderer" thread
    let running = Arc::new(AtomicBool::new(true));
    let renderer = thread::spawn({
        let running = Arc::clone(&running);
        move || {
            let (mut grains, mut gain_changes) = (0, 0);
            while running.load(Ordering::Relaxed) || !queue.is_empty() {
                match queue.pop() {
                    Some(SinkEvent::Grain { .. }) => grains += 1,
                    Some(SinkEvent::Gain { voice, gain, .. }) => {
                        gain_changes += 1;
                        log::info!("Voice {voice} gain -> {gain:.3}");
                    }
                    None => thread::sleep(Duration::from_millis(1)),
                }
            }
            (grains, gain_changes)
        }
    });

    // Start an automated arpeggio voice
    let arpeggio = VoiceId::automation(0);
    engine.start_voice(
        arpeggio,
        &ParamUpdate::new()
            .with_position(0.25)
            .with_grain_duration(0.08)
            .with_inter_onset(0.125)
            .with_arpeggiator(Some(
                ArpConfig::default()
                    .with_scale(ScalePreset::PentatonicMinor, 0)
                    .with_range(-12, 12)
                    .with_steps(5)
                    .with_playback(ArpPlayback::PingPong),
            )),
    );

    // Simulate two fingers moving across the screen
    let mapping = GestureMapping::default().with_density(0.7);
    let fingers = [VoiceId::touch(0), VoiceId::touch(1)];
    let steps = 80;
    for step in 0..steps {
        let t = step as f64 / steps as f64;
        for (index, finger) in fingers.iter().enumerate() {
            let offset = index as f64 * 0.5;
            let gesture = GestureState::new(
                (t + offset) % 1.0,
                0.5 + 0.4 * (t * 4.0 + offset).sin(),
                0.6 + 0.4 * t,
                0.3 * index as f64,
                (t * 8.0).sin().abs(),
            );
            let update = mapping.to_update(&gesture);
            if step == 0 {
                engine.start_voice(*finger, &update);
            } else {
                engine.update_voice(*finger, &update);
            }
        }
        if step == steps / 2 {
            engine.release_voice(fingers[1]);
        }
        engine.tick();
        thread::sleep(Duration::from_millis(25));
    }

    for id in [fingers[0], arpeggio] {
        if let Some(stats) = engine.voice_stats(id) {
            log::info!(
                "{id}: {} grains emitted, {} dropped, {} muted",
                stats.emitted,
                stats.dropped,
                stats.muted
            );
        }
    }
    engine.stop_all_voices();

    running.store(false, Ordering::Relaxed);
    let (grains, gain_changes) = renderer.join().unwrap_or_default();
    log::info!("Rendered {grains} grains and {gain_changes} gain changes");

    Ok(())
}
