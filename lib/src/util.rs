use chrono::Utc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static CLOCK_ANCHOR: OnceLock<(i64, Instant)> = OnceLock::new();

/// Milliseconds since the unix epoch, measured on a monotonic clock.
///
/// The wall-clock reading is taken once, on first use, and every later value is
/// that reading plus the monotonic time elapsed since. Timestamps therefore never
/// go backwards within a process, which keeps `end >= start >= arrival` true for
/// every recorded task.
pub fn now_millis() -> i64 {
    let (wall_anchor, instant_anchor) =
        CLOCK_ANCHOR.get_or_init(|| (Utc::now().timestamp_millis(), Instant::now()));
    wall_anchor + instant_anchor.elapsed().as_millis() as i64
}

/// Peer selected for negotiation: the next core in ring order.
/// With a single core the ring degenerates to the core itself.
pub fn get_ring_successor(core_id: usize, num_cores: usize) -> usize {
    if num_cores <= 1 {
        return core_id;
    }
    (core_id + 1) % num_cores
}

/// Wall time spent simulating `burst_time` units.
pub fn burst_duration(burst_time: u32, time_unit: Duration) -> Duration {
    time_unit.saturating_mul(burst_time)
}
