use super::*;

#[test]
fn compressor_lets_first_request_through() {
    let t0 = Instant::now();
    let mut c = ProgressCompressor::default();
    assert!(c.request(t0));
    assert!(!c.request(t0 + Duration::from_millis(10)));
    assert!(!c.request(t0 + Duration::from_millis(20)));
    assert_eq!(c.next_deadline(), Some(t0 + PROGRESS_UPDATE_INTERVAL));

    assert!(!c.poll(t0 + Duration::from_millis(30)));
    assert!(c.poll(t0 + Duration::from_millis(40)));
    assert!(!c.poll(t0 + Duration::from_millis(90)), "folded update fires once");
    assert_eq!(c.next_deadline(), None);

    assert!(c.request(t0 + Duration::from_millis(200)));
}

#[test]
fn compressor_reset_forgets_pending_update() {
    let t0 = Instant::now();
    let mut c = ProgressCompressor::new(Duration::from_millis(100));
    assert!(c.request(t0));
    assert!(!c.request(t0 + Duration::from_millis(1)));
    c.reset();
    assert!(!c.poll(t0 + Duration::from_secs(1)));
    assert!(c.request(t0 + Duration::from_millis(2)));
}

#[test]
fn clock_switches_to_hours() {
    assert_eq!(format_clock(Duration::from_secs(75), false), "01:15");
    assert_eq!(format_clock(Duration::from_secs(3725), true), "01:02:05");
    assert_eq!(format_clock(Duration::from_secs(5), true), "00:00:05");
}

#[test]
fn estimate_scales_elapsed_by_remaining_share() {
    let snap = ProgressSnapshot {
        total: 10,
        processed: 4,
        elapsed: Duration::from_secs(20),
        memory_limited_workers: None,
    };
    assert_eq!(snap.estimated(), Duration::from_secs(50));

    let none = ProgressSnapshot {
        processed: 0,
        ..snap
    };
    assert_eq!(none.estimated(), Duration::ZERO);
}

#[test]
fn label_lists_times_and_memory_note() {
    let snap = ProgressSnapshot {
        total: 10,
        processed: 5,
        elapsed: Duration::from_secs(65),
        memory_limited_workers: None,
    };
    assert_eq!(
        format_progress_label("Regenerating frames", &snap),
        "Regenerating frames\n\nFrame 5 of 10\nElapsed: 01:05\nEstimated: 02:10"
    );

    let long = ProgressSnapshot {
        elapsed: Duration::from_secs(1900),
        memory_limited_workers: Some(2),
        ..snap
    };
    let label = format_progress_label("Export", &long);
    assert!(label.contains("Elapsed: 00:31:40"), "{label}");
    assert!(label.contains("Estimated: 01:03:20"), "{label}");
    assert!(label.ends_with("limited to 2."), "{label}");
}
