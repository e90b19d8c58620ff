//! Integration tests for the LRU-K replacer

use bedrock::buffer::LruKReplacer;
use bedrock::common::FrameId;

#[test]
fn test_lru_k_eviction_order() {
    let replacer = LruKReplacer::new(2, 10);

    for i in 0..5 {
        replacer.record_access(FrameId::new(i));
        replacer.set_evictable(FrameId::new(i), true);
    }

    assert_eq!(replacer.size(), 5);

    // All frames have a single access (< k=2), so all are +inf distance;
    // eviction runs in first-access order.
    for i in 0..5 {
        assert_eq!(replacer.evict(), Some(FrameId::new(i)));
    }

    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_scenario_k2_pool7() {
    // access 1 2 3 4 1 2 3 4 5 6, everything evictable:
    // cold frames 5 and 6 go first (in first-access order), then the warm
    // frame whose 2nd-previous access is oldest, which is frame 1.
    let replacer = LruKReplacer::new(2, 7);

    for fid in [1u32, 2, 3, 4, 1, 2, 3, 4, 5, 6] {
        replacer.record_access(FrameId::new(fid));
    }
    replacer.set_evictable(FrameId::new(6), true);
    for fid in [1u32, 2, 3, 4, 5] {
        replacer.set_evictable(FrameId::new(fid), true);
    }
    assert_eq!(replacer.size(), 6);

    assert_eq!(replacer.evict(), Some(FrameId::new(5)));
    assert_eq!(replacer.evict(), Some(FrameId::new(6)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.size(), 2);
}

#[test]
fn test_lru_k_respects_k_distance() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));

    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));

    replacer.record_access(FrameId::new(2));
    replacer.record_access(FrameId::new(2));

    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);
    replacer.set_evictable(FrameId::new(2), true);

    // Frame 0 is cold (+inf), then frame 1 has the larger distance.
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_k_pinned_frames_not_evicted() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(2));

    replacer.set_evictable(FrameId::new(1), true);
    replacer.set_evictable(FrameId::new(2), true);

    assert_eq!(replacer.size(), 2);

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_toggle_evictable() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.size(), 1);

    replacer.set_evictable(FrameId::new(0), false);
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);

    replacer.set_evictable(FrameId::new(0), true);
    assert_eq!(replacer.size(), 1);
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_k_remove() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.set_evictable(FrameId::new(0), true);
    replacer.set_evictable(FrameId::new(1), true);

    assert_eq!(replacer.size(), 2);

    replacer.remove(FrameId::new(0));
    assert_eq!(replacer.size(), 1);

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_multiple_inf_distance() {
    let replacer = LruKReplacer::new(3, 10);

    replacer.record_access(FrameId::new(0));

    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));

    replacer.record_access(FrameId::new(2));

    for i in 0..3 {
        replacer.set_evictable(FrameId::new(i), true);
    }

    // All below k=3 accesses; first-access order decides.
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_k_concurrent_access() {
    use std::sync::Arc;
    use std::thread;

    let replacer = Arc::new(LruKReplacer::new(2, 100));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..25 {
                    let frame_id = FrameId::new((t * 25 + i) as u32);
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, true);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 100);

    for _ in 0..100 {
        assert!(replacer.evict().is_some());
    }

    assert_eq!(replacer.size(), 0);
}
