use parley::kernel::buffer::StreamingTextBuffer;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_completed_buffer_yields_chunks_in_order() {
    let buffer = StreamingTextBuffer::new();
    buffer.add_chunk("Hel");
    buffer.add_chunk("lo");
    buffer.complete();

    let chunks: Vec<String> = buffer.chunks().collect();
    assert_eq!(chunks, vec!["Hel".to_string(), "lo".to_string()]);
}

#[test]
fn test_consumer_blocks_until_producer_finishes() {
    let buffer = Arc::new(StreamingTextBuffer::new());

    let consumer = {
        let buffer = buffer.clone();
        thread::spawn(move || buffer.chunks().collect::<Vec<_>>())
    };

    for word in ["one ", "two ", "three"] {
        thread::sleep(Duration::from_millis(10));
        buffer.add_chunk(word);
    }
    buffer.complete();

    let chunks = consumer.join().expect("consumer panicked");
    assert_eq!(chunks, vec!["one ", "two ", "three"]);
}

#[test]
fn test_clear_wakes_blocked_consumer() {
    let buffer = Arc::new(StreamingTextBuffer::new());
    let (done_tx, done_rx) = mpsc::channel();

    {
        let buffer = buffer.clone();
        thread::spawn(move || {
            let chunks: Vec<String> = buffer.chunks().collect();
            let _ = done_tx.send(chunks);
        });
    }

    // Consumer is parked on an empty, incomplete buffer.
    thread::sleep(Duration::from_millis(50));
    assert!(done_rx.try_recv().is_err(), "consumer should still be blocked");

    buffer.clear();
    let chunks = done_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("clear must wake the consumer");
    assert!(chunks.is_empty());
}

#[test]
fn test_clear_drops_unconsumed_chunks() {
    let buffer = StreamingTextBuffer::new();
    buffer.add_chunk("a");
    buffer.add_chunk("b");
    buffer.add_chunk("c");

    let mut chunks = buffer.chunks();
    assert_eq!(chunks.next().as_deref(), Some("a"));

    buffer.clear();
    assert_eq!(chunks.next(), None, "no chunk may be yielded after clear");
    assert_eq!(chunks.next(), None);
    assert_eq!(buffer.chunks().next(), None, "new consumers see nothing either");
}

#[test]
fn test_clear_is_permanent_and_idempotent() {
    let buffer = StreamingTextBuffer::new();
    buffer.clear();
    buffer.clear();
    assert!(buffer.is_cancelled());

    buffer.add_chunk("late");
    buffer.complete();
    assert!(buffer.is_cancelled());
    assert_eq!(buffer.chunks().count(), 0);
}

#[test]
fn test_snapshot_does_not_consume() {
    let buffer = StreamingTextBuffer::new();
    buffer.add_chunk("Hello, ");
    buffer.add_chunk("world");

    assert_eq!(buffer.snapshot(), "Hello, world");

    buffer.complete();
    assert_eq!(buffer.chunks().count(), 2);
    assert_eq!(buffer.snapshot(), "Hello, world");
}

#[test]
fn test_each_consumer_has_its_own_offset() {
    let buffer = StreamingTextBuffer::new();
    buffer.add_chunk("x");
    buffer.add_chunk("y");
    buffer.complete();

    let mut first = buffer.chunks();
    assert_eq!(first.next().as_deref(), Some("x"));
    assert_eq!(first.offset(), 1);

    let second: Vec<String> = buffer.chunks().collect();
    assert_eq!(second, vec!["x", "y"]);

    assert_eq!(first.next().as_deref(), Some("y"));
    assert_eq!(first.next(), None);
}

#[test]
fn test_chunks_after_completion_are_discarded() {
    let buffer = StreamingTextBuffer::new();
    assert!(buffer.add_chunk("kept"));
    assert!(!buffer.is_complete());
    buffer.complete();
    buffer.complete();
    assert!(buffer.is_complete());

    assert!(!buffer.add_chunk("dropped"));
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.snapshot(), "kept");
}
