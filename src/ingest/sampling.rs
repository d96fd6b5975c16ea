//! Sampling by endpoint throughput class: the primary backpressure knob
//! against high-throughput endpoints.

use rand::Rng;

/// Draws a random integer in `[0,100)` and compares it against `rate`.
/// Returns `true` when the request should be enqueued for validation.
pub fn should_enqueue(rate: u8) -> bool {
    let draw: u8 = rand::thread_rng().gen_range(0..100);
    draw < rate
}
