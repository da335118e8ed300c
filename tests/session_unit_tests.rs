// Unit tests for the session building blocks: resend buffer, countdown
// sequencing, tick scheduling, and start options.

use practice_stream::protocol::FrameHeader;
use practice_stream::session::{
    countdown_slice_count, FrameSequencer, ResendBuffer, ResendEntry, SliceDisposition,
    StartOptions, TickScheduler, TickState,
};
use std::time::Duration;
use tokio::time::Instant;

fn entry(frame_no: u64, bytes: &[u8]) -> ResendEntry {
    ResendEntry {
        header: FrameHeader {
            recording_id: "rec-1".to_string(),
            frame_no,
            frame_duration_in_ms: 250,
            bytes_len: bytes.len(),
        },
        bytes: bytes.to_vec(),
    }
}

#[test]
fn test_resend_buffer_stays_bounded() {
    let mut buffer = ResendBuffer::new(3);

    for frame_no in 1..=10 {
        buffer.put(frame_no, entry(frame_no, b"x"));
        assert!(buffer.len() <= 3);
    }

    assert_eq!(buffer.frame_numbers().collect::<Vec<_>>(), vec![8, 9, 10]);
}

#[test]
fn test_resend_buffer_evicts_oldest_inserted() {
    let mut buffer = ResendBuffer::new(2);

    // Insertion order, not frame number, decides eviction
    buffer.put(5, entry(5, b"five"));
    buffer.put(2, entry(2, b"two"));
    buffer.put(9, entry(9, b"nine"));

    assert!(!buffer.contains(5));
    assert!(buffer.contains(2));
    assert!(buffer.contains(9));
}

#[test]
fn test_resend_buffer_lookup_is_not_access_ordered() {
    let mut buffer = ResendBuffer::new(2);
    buffer.put(1, entry(1, b"a"));
    buffer.put(2, entry(2, b"b"));

    // Reading frame 1 must not protect it from eviction
    assert!(buffer.get(1).is_some());
    buffer.put(3, entry(3, b"c"));

    assert!(buffer.get(1).is_none());
}

#[test]
fn test_resend_buffer_keeps_original_on_duplicate_key() {
    let mut buffer = ResendBuffer::new(4);

    assert!(buffer.put(1, entry(1, b"original")));
    assert!(!buffer.put(1, entry(1, b"replacement")));

    assert_eq!(buffer.get(1).unwrap().bytes, b"original");
    assert_eq!(buffer.len(), 1);
}

#[test]
fn test_resend_buffer_clear() {
    let mut buffer = ResendBuffer::default();
    buffer.put(1, entry(1, b"a"));
    buffer.clear();

    assert!(buffer.is_empty());
    assert_eq!(buffer.capacity(), 128);
}

#[test]
fn test_four_beats_at_60_bpm_discards_sixteen_slices() {
    let options = StartOptions::new("rec-1").with_countdown(4, 60.0);
    assert_eq!(options.countdown_ms(), 4000);

    let mut sequencer = FrameSequencer::new(options.countdown_ms(), 250);
    let mut discarded = 0;
    let mut boundaries = 0;

    loop {
        match sequencer.classify() {
            SliceDisposition::Countdown {
                boundary_reached, ..
            } => {
                discarded += 1;
                if boundary_reached {
                    boundaries += 1;
                }
            }
            SliceDisposition::Frame(frame_no) => {
                assert_eq!(frame_no, 1);
                break;
            }
        }
    }

    assert_eq!(discarded, 16);
    assert_eq!(boundaries, 1);
    assert_eq!(sequencer.classify(), SliceDisposition::Frame(2));
}

#[test]
fn test_countdown_slice_count_rounds_up() {
    assert_eq!(countdown_slice_count(0, 250), 0);
    assert_eq!(countdown_slice_count(4000, 250), 16);
    assert_eq!(countdown_slice_count(4001, 250), 17);
    assert_eq!(countdown_slice_count(100, 250), 1);
}

#[test]
fn test_countdown_ms_for_odd_tempo() {
    // 3 beats at 90 bpm = 3 * 666.67ms
    let options = StartOptions::new("rec-1").with_countdown(3, 90.0);

    assert_eq!(options.countdown_ms(), 2000);
}

#[test]
fn test_countdown_ms_ignores_bad_tempo() {
    assert_eq!(StartOptions::new("a").with_countdown(4, 0.0).countdown_ms(), 0);
    assert_eq!(StartOptions::new("a").with_countdown(4, -120.0).countdown_ms(), 0);
    assert_eq!(StartOptions::new("a").with_countdown(4, f64::NAN).countdown_ms(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_is_single_flight() {
    let mut scheduler = TickScheduler::new(Duration::from_millis(265));

    assert!(scheduler.arm());
    let first = scheduler.state();

    tokio::time::advance(Duration::from_millis(100)).await;

    // A second arm while pending is refused and keeps the original deadline
    assert!(!scheduler.arm());
    assert_eq!(scheduler.state(), first);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_fires_after_delay_and_goes_idle() {
    let mut scheduler = TickScheduler::new(Duration::from_millis(265));
    let armed_at = Instant::now();
    scheduler.arm();

    scheduler.fired().await;

    assert!(armed_at.elapsed() >= Duration::from_millis(265));
    assert_eq!(scheduler.state(), TickState::Idle);
    assert!(scheduler.arm());
}

#[tokio::test(start_paused = true)]
async fn test_disarmed_scheduler_never_fires() {
    let mut scheduler = TickScheduler::new(Duration::from_millis(10));
    scheduler.arm();
    scheduler.disarm();

    let fired = tokio::time::timeout(Duration::from_secs(5), scheduler.fired()).await;

    assert!(fired.is_err());
}
