use super::*;
use crate::clock::PlaybackState;
use crate::output::{OutputEventRouter, SynthSink};
use crate::sequencer::{EventStream, EventStreamPlayer, Sequencer, TimedEvent};
use crate::timemap::{RawTimemapEntry, DEFAULT_EPSILON_MS};

/// Measure 0 is repeated once after measure 1.
fn repeat_timeline() -> Timeline {
    Timeline::new(
        vec![
            RawTimemapEntry::new(0, 0.0),
            RawTimemapEntry::new(1, 500.0),
            RawTimemapEntry::new(0, 900.0),
            RawTimemapEntry::new(2, 1400.0),
        ],
        DEFAULT_EPSILON_MS,
    )
    .unwrap()
}

fn clock_with(events: Vec<TimedEvent>) -> PlaybackClock {
    let router = OutputEventRouter::new(Box::new(SynthSink::new()), false);
    PlaybackClock::new(Box::new(Sequencer::new(EventStream::new(events), router, 0.0)))
}

fn clock() -> PlaybackClock {
    clock_with(Vec::new())
}

#[test]
fn test_tick_without_schedule_does_nothing() {
    let timeline = repeat_timeline();
    let mut clock = clock();
    let mut sync = SyncLoop::new();
    clock.play(0.0);

    assert_eq!(sync.tick(&mut clock, &timeline, 10.0), None);
    assert_eq!(sync.ticks(), 0);
}

#[test]
fn test_tick_reschedules_while_playing() {
    let timeline = repeat_timeline();
    let mut clock = clock();
    let mut sync = SyncLoop::new();
    clock.play(0.0);
    sync.start();

    let cursor = sync.tick(&mut clock, &timeline, 100.0).unwrap();
    assert_eq!(cursor.measure_index, 0);
    assert_eq!(cursor.measure_offset, 100.0);
    assert_eq!(cursor.measure_duration, 500.0);
    assert!(sync.is_scheduled());
}

#[test]
fn test_pause_leaves_one_stray_tick() {
    let timeline = repeat_timeline();
    let mut clock = clock();
    let mut sync = SyncLoop::new();
    clock.play(0.0);
    sync.start();
    sync.tick(&mut clock, &timeline, 16.0);

    clock.pause(20.0);
    assert!(sync.is_scheduled());
    assert_eq!(sync.tick(&mut clock, &timeline, 32.0), None);
    assert!(!sync.is_scheduled());
    assert_eq!(sync.tick(&mut clock, &timeline, 48.0), None);
    assert_eq!(sync.ticks(), 1);
}

#[test]
fn test_stop_cancels_pending_tick() {
    let timeline = repeat_timeline();
    let mut clock = clock();
    let mut sync = SyncLoop::new();
    clock.play(0.0);
    sync.start();
    sync.tick(&mut clock, &timeline, 16.0);

    sync.stop();
    assert!(!sync.is_scheduled());
    assert_eq!(sync.tick(&mut clock, &timeline, 32.0), None);
    assert_eq!(sync.ticks(), 1);
}

#[test]
fn test_repeat_is_followed_by_elapsed_time() {
    let timeline = repeat_timeline();
    let mut clock = clock();
    let mut sync = SyncLoop::new();
    clock.play(0.0);
    sync.start();

    let cursor = sync.tick(&mut clock, &timeline, 0.0).unwrap();
    assert_eq!((cursor.measure_index, cursor.measure_offset), (0, 0.0));

    let cursor = sync.tick(&mut clock, &timeline, 500.0).unwrap();
    assert_eq!(cursor.measure_index, 1);
    assert_eq!(cursor.measure_start, 500.0);
    assert_eq!(cursor.measure_offset, 0.0);
    assert_eq!(cursor.measure_duration, 400.0);

    let cursor = sync.tick(&mut clock, &timeline, 900.0).unwrap();
    assert_eq!(cursor.measure_index, 0);
    assert_eq!(cursor.measure_start, 0.0);
    assert_eq!(cursor.measure_offset, 0.0);

    let cursor = sync.tick(&mut clock, &timeline, 950.0).unwrap();
    assert_eq!(cursor.measure_index, 0);
    assert!((cursor.measure_offset - 50.0).abs() < 1e-9);
    assert_eq!(cursor.measure_duration, 500.0);
}

#[test]
fn test_measure_offset_restarts_on_late_frame() {
    let timeline = repeat_timeline();
    let mut clock = clock();
    let mut sync = SyncLoop::new();
    clock.play(0.0);
    sync.start();
    sync.tick(&mut clock, &timeline, 480.0);

    // First frame inside measure 1 arrives 16ms after it began
    let cursor = sync.tick(&mut clock, &timeline, 516.0).unwrap();
    assert_eq!(cursor.measure_index, 1);
    assert_eq!(cursor.measure_offset, 0.0);

    let cursor = sync.tick(&mut clock, &timeline, 532.0).unwrap();
    assert_eq!(cursor.measure_offset, 16.0);
}

#[test]
fn test_seek_during_playback_is_seen_by_next_tick() {
    let timeline = repeat_timeline();
    let mut clock = clock();
    let mut sync = SyncLoop::new();
    clock.play(0.0);
    sync.start();
    sync.tick(&mut clock, &timeline, 100.0);

    clock.move_to(2, 1400.0, 30.0, 200.0);
    let cursor = sync.tick(&mut clock, &timeline, 216.0).unwrap();
    assert_eq!(cursor.measure_index, 2);
    assert_eq!(cursor.measure_start, 1400.0);
    assert!((cursor.measure_offset - 46.0).abs() < 1e-9);
    assert_eq!(cursor.measure_duration, 0.0);
}

#[test]
fn test_past_the_end_clamps_to_last_measure() {
    let timeline = repeat_timeline();
    let mut clock = clock();
    let mut sync = SyncLoop::new();
    clock.play(0.0);
    sync.start();

    let cursor = sync.tick(&mut clock, &timeline, 60_000.0).unwrap();
    assert_eq!(cursor.measure_index, 2);
}

#[test]
fn test_tick_advances_sequencer() {
    let timeline = repeat_timeline();
    let mut clock = clock_with(vec![
        TimedEvent::new(0.0, vec![0x90, 60, 100]),
        TimedEvent::new(500.0, vec![0x80, 60, 0]),
    ]);
    let mut sync = SyncLoop::new();
    clock.play(1000.0);
    sync.start();

    sync.tick(&mut clock, &timeline, 1250.0);
    assert_eq!(clock.player().position(), 250.0);
    assert_eq!(clock.player().state(), PlaybackState::Playing);
}
