// Folding per-task control messages into stream-level signals.

use task_state::{
    ControlMessage, DrainMessage, EndOfStreamMessage, Signal, SignalTracker, WatermarkMessage,
};

type Message = ControlMessage<Vec<u8>>;

fn watermark(ts: i64, task: &str, count: u32) -> Message {
    ControlMessage::Watermark(WatermarkMessage::new(ts, task, count))
}

fn eos(task: &str, count: u32) -> Message {
    ControlMessage::EndOfStream(EndOfStreamMessage::new(task, count))
}

// =============================================================================
// Test 1: User records never produce a signal
// =============================================================================
#[test]
fn user_records_are_ignored() {
    let mut tracker = SignalTracker::new();
    assert_eq!(tracker.observe("s", &Message::User(b"row".to_vec())), None);
    assert!(!tracker.all_end_of_stream());
}

// =============================================================================
// Test 2: End of stream fires once every task reported
// =============================================================================
#[test]
fn end_of_stream_after_all_tasks() {
    let mut tracker = SignalTracker::new();
    assert_eq!(tracker.observe("s", &eos("t0", 3)), None);
    assert_eq!(tracker.observe("s", &eos("t2", 3)), None);
    assert!(!tracker.is_end_of_stream("s"));
    assert_eq!(tracker.observe("s", &eos("t1", 3)), Some(Signal::EndOfStream));
    assert!(tracker.is_end_of_stream("s"));
    // Repeats do not fire again.
    assert_eq!(tracker.observe("s", &eos("t1", 3)), None);
}

// =============================================================================
// Test 3: Streams are tracked independently
// =============================================================================
#[test]
fn streams_are_independent() {
    let mut tracker = SignalTracker::new();
    assert_eq!(tracker.observe("left", &eos("t0", 1)), Some(Signal::EndOfStream));
    assert_eq!(tracker.observe("right", &eos("t0", 2)), None);
    assert!(!tracker.all_end_of_stream());
    assert_eq!(tracker.observe("right", &eos("t1", 2)), Some(Signal::EndOfStream));
    assert!(tracker.all_end_of_stream());
}

// =============================================================================
// Test 4: Drain completes on its own set of tasks
// =============================================================================
#[test]
fn drain_completes_independently_of_end_of_stream() {
    let mut tracker = SignalTracker::new();
    let drain = |task: &str| Message::Drain(DrainMessage::new(task, 2).with_run_id("run-1"));

    assert_eq!(tracker.observe("s", &eos("t0", 2)), None);
    assert_eq!(tracker.observe("s", &drain("t0")), None);
    assert_eq!(tracker.observe("s", &drain("t1")), Some(Signal::Drain));
    assert!(tracker.is_drained("s"));
    assert!(!tracker.is_end_of_stream("s"));
}

// =============================================================================
// Test 5: Aggregated watermark is the minimum and only moves forward
// =============================================================================
#[test]
fn watermark_is_minimum_over_tasks() {
    let mut tracker = SignalTracker::new();
    assert_eq!(tracker.observe("s", &watermark(100, "t0", 3)), None);
    assert_eq!(tracker.observe("s", &watermark(80, "t1", 3)), None);
    assert_eq!(tracker.watermark("s"), None);
    assert_eq!(tracker.observe("s", &watermark(90, "t2", 3)), Some(Signal::Watermark(80)));

    // t1 catches up; t2 is now the slowest.
    assert_eq!(tracker.observe("s", &watermark(120, "t1", 3)), Some(Signal::Watermark(90)));
    // Same minimum: nothing new to announce.
    assert_eq!(tracker.observe("s", &watermark(130, "t0", 3)), None);
    // A late, older watermark from t2 is ignored.
    assert_eq!(tracker.observe("s", &watermark(10, "t2", 3)), None);
    assert_eq!(tracker.watermark("s"), Some(90));
}

// =============================================================================
// Test 6: Signals arriving over the wire drive the tracker
// =============================================================================
#[test]
fn decoded_messages_feed_the_tracker() {
    use task_state::IntermediateMessageCodec;
    use task_state::control::BytesSerde;

    let codec = IntermediateMessageCodec::new(BytesSerde);
    let mut tracker = SignalTracker::new();
    let wire: Vec<Vec<u8>> = [eos("t0", 2), Message::User(b"x".to_vec()), eos("t1", 2)]
        .iter()
        .map(|m| codec.encode(m).unwrap())
        .collect();

    let signals: Vec<Signal> = wire
        .iter()
        .filter_map(|bytes| tracker.observe("s", &codec.decode::<Vec<u8>>(bytes).unwrap()))
        .collect();
    assert_eq!(signals, vec![Signal::EndOfStream]);
}
