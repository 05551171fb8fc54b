use super::*;

fn roi() -> PixelRect {
    PixelRect::from_size(8, 8)
}

fn span(a: i32, b: i32) -> TimeSpan {
    TimeSpan::from_time_to_time(a, b)
}

fn cache_with(runs: &[(TimeSpan, u32)]) -> FrameCache<u32> {
    let mut cache = FrameCache::new();
    for &(s, payload) in runs {
        cache.add_frame(s, roi(), payload);
    }
    cache
}

#[test]
fn empty_cache_reports_uncached() {
    let cache = FrameCache::<u32>::new();
    assert!(cache.is_empty());
    assert_eq!(cache.frame_status(0), CacheStatus::Uncached);
    assert_eq!(cache.frame(0), None);
    assert!(cache.should_upload_new_frame(3, -1));
}

#[test]
fn added_span_is_cached_with_its_payload() {
    let cache = cache_with(&[(span(2, 4), 7), (span(5, 5), 8)]);
    assert_eq!(cache.frame_status(1), CacheStatus::Uncached);
    for t in 2..=4 {
        assert_eq!(cache.frame_status(t), CacheStatus::Cached);
        assert_eq!(cache.frame(t), Some(&7));
        assert_eq!(cache.frame_id_at(t), Some(2));
    }
    assert_eq!(cache.frame(5), Some(&8));
    assert_eq!(cache.frame_status(6), CacheStatus::Uncached);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.cached_span(3), Some(span(2, 4)));
}

#[test]
fn invalidate_round_trip() {
    let mut cache = cache_with(&[(span(0, 2), 1), (span(3, 9), 2)]);
    assert!(cache.invalidate_frames(span(2, 4), roi()));

    let status = (0..=10).map(|t| cache.frame_status(t)).collect::<Vec<_>>();
    use CacheStatus::{Cached, Uncached};
    assert_eq!(
        status,
        vec![Cached, Cached, Uncached, Uncached, Uncached, Cached, Cached, Cached, Cached, Cached, Uncached]
    );
    assert_eq!(cache.frame(1), Some(&1));
    assert_eq!(cache.frame(5), Some(&2), "moved run keeps its payload");
    assert_eq!(cache.frame_id_at(9), Some(5));

    assert!(!cache.invalidate_frames(span(2, 4), roi()), "second drop is a no-op");
}

#[test]
fn invalidate_infinite_span_clears_tail() {
    let mut cache = cache_with(&[(span(0, 2), 1), (TimeSpan::infinite(3), 2)]);
    assert_eq!(cache.frame(1_000), Some(&2));
    cache.invalidate_frames(TimeSpan::infinite(1), PixelRect::default());
    assert_eq!(cache.frame_status(0), CacheStatus::Cached);
    assert_eq!(cache.frame_status(1), CacheStatus::Uncached);
    assert_eq!(cache.frame_status(1_000), CacheStatus::Uncached);
    assert_eq!(cache.len(), 1);
}

#[test]
fn add_frame_replaces_overlapping_content() {
    let mut cache = cache_with(&[(span(0, 5), 1)]);
    cache.add_frame(span(2, 3), roi(), 9);
    assert_eq!(cache.frame(0), Some(&1));
    assert_eq!(cache.frame(1), Some(&1));
    assert_eq!(cache.frame(2), Some(&9));
    assert_eq!(cache.frame(3), Some(&9));
    // The old run's tail past the new frame shared the stale payload and is gone.
    assert_eq!(cache.frame_status(4), CacheStatus::Uncached);
    assert_eq!(cache.ranges().get(&0), Some(&2));
    assert_eq!(cache.ranges().get(&2), Some(&2));
}

#[test]
fn add_frame_ignores_invalid_span() {
    let mut cache = FrameCache::<u32>::new();
    cache.add_frame(span(4, 1), roi(), 1);
    assert!(cache.is_empty());
}

#[test]
fn add_frame_skips_span_longer_than_the_map_holds() {
    let mut cache = cache_with(&[(span(-3, -1), 1)]);
    cache.add_frame(span(-2, i32::MAX), roi(), 2);
    assert_eq!(cache.frame(-3), Some(&1));
    assert_eq!(cache.frame_status(0), CacheStatus::Uncached);
    assert_eq!(cache.frames.len(), cache.len());
}

#[test]
fn glue_identical_frames_into_infinite_tail_releases_it() {
    let mut cache = cache_with(&[(span(0, 1), 1)]);
    cache.add_frame(TimeSpan::infinite(4), roi(), 2);
    assert!(cache.glue_identical_frames(span(1, 5)));
    assert_eq!(cache.cached_span(100), Some(TimeSpan::infinite(0)));
    assert_eq!(cache.frame(100), Some(&1));
    assert_eq!(cache.frames.len(), 1);
}

#[test]
fn glue_identical_frames_extends_existing_payload() {
    let mut cache = cache_with(&[(span(0, 0), 1), (span(3, 3), 2)]);
    assert!(!cache.glue_identical_frames(span(1, 2)), "start is not cached");
    assert!(cache.glue_identical_frames(span(0, 2)));
    assert_eq!(cache.frame(2), Some(&1));
    assert_eq!(cache.frame(3), Some(&2));
    assert!(!cache.glue_identical_frames(span(0, 1)), "already covered");
}

#[test]
fn should_upload_only_when_leaving_the_run() {
    let cache = cache_with(&[(span(0, 3), 1), (span(4, 4), 2)]);
    assert!(!cache.should_upload_new_frame(3, 0));
    assert!(cache.should_upload_new_frame(4, 3));
    assert!(cache.should_upload_new_frame(1, 9), "old time not cached");

    let inf = cache_with(&[(TimeSpan::infinite(10), 3)]);
    assert!(!inf.should_upload_new_frame(500, 10));
    assert!(inf.should_upload_new_frame(9, 10));
}

#[test]
fn valid_roi_needs_every_frame_and_enough_area() {
    let mut cache = FrameCache::<u32>::new();
    cache.add_frame(span(0, 1), PixelRect::from_size(8, 8), 1);
    cache.add_frame(span(2, 2), PixelRect::from_size(4, 4), 2);

    assert!(cache.frames_have_valid_roi(span(0, 1), PixelRect::from_size(8, 8)));
    assert!(!cache.frames_have_valid_roi(span(0, 2), PixelRect::from_size(8, 8)));
    assert!(cache.frames_have_valid_roi(span(0, 2), PixelRect::new(1, 1, 2, 2)));
    assert!(!cache.frames_have_valid_roi(span(0, 3), PixelRect::new(1, 1, 2, 2)));
    assert!(!cache.frames_have_valid_roi(TimeSpan::infinite(0), PixelRect::default()));
}

#[test]
fn converted_data_covers_identical_span() {
    let mut cache: FrameCache = FrameCache::new();
    let region = PixelRect::from_size(2, 1);
    let pixels = FramePixels::new(region, vec![9; 8]).unwrap();
    cache.add_converted_frame_data(ConvertedFrameData {
        time: 4,
        identical_span: span(4, 6),
        region,
        pixels: pixels.clone(),
    });
    assert_eq!(cache.frame(6), Some(&pixels));
    assert_eq!(cache.frame_region(5), Some(region));
    assert_eq!(cache.frame_status(7), CacheStatus::Uncached);
}

#[test]
fn clear_and_debug() {
    let mut cache = cache_with(&[(span(0, 1), 1), (TimeSpan::infinite(5), 2)]);
    assert_eq!(format!("{cache:?}"), "FrameCache { runs: [[0, 1], [5, inf)] }");
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.frame(6), None);
}
