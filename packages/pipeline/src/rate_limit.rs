//! Sliding-window rate limiting for outbound API calls.
//!
//! One limiter per logical channel (the fetch gateway, the LLM endpoint).
//! `acquire()` blocks the caller until a dispatch slot is free; the window
//! of recent dispatch timestamps is the only shared state and sits behind a
//! mutex. Callers queue on the mutex and are served roughly in timestamp
//! order. There is no cancellation inside `acquire` — aborting happens at
//! the stage level.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Bounds on the adaptive capacity factor.
const MIN_LOAD_FACTOR: f64 = 0.7;
const MAX_LOAD_FACTOR: f64 = 1.3;

/// Source of a normalized system-load sample (1.0 ≈ fully busy).
///
/// Sampling is advisory smoothing only: a limiter without a sampler, or one
/// whose sampler returns `None`, runs at its configured capacity.
pub trait LoadSampler: Send + Sync {
    fn sample(&self) -> Option<f64>;
}

/// Reads the one-minute load average from `/proc/loadavg`, normalized by
/// the number of available cores. Returns `None` off Linux.
pub struct ProcLoadSampler;

impl LoadSampler for ProcLoadSampler {
    fn sample(&self) -> Option<f64> {
        let raw = std::fs::read_to_string("/proc/loadavg").ok()?;
        let one_minute: f64 = raw.split_whitespace().next()?.parse().ok()?;
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Some(one_minute / cores as f64)
    }
}

struct Window {
    timestamps: VecDeque<Instant>,
    factor: f64,
    last_sampled: Option<Instant>,
}

/// Sliding-window limiter: at most `capacity × factor` dispatches within
/// any trailing `period`.
pub struct SlidingWindowLimiter {
    capacity: usize,
    period: Duration,
    sampler: Option<Arc<dyn LoadSampler>>,
    sample_every: Duration,
    window: Mutex<Window>,
}

impl SlidingWindowLimiter {
    /// Limiter allowing `capacity` dispatches per `period`.
    pub fn new(capacity: usize, period: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            period,
            sampler: None,
            sample_every: Duration::from_secs(5),
            window: Mutex::new(Window {
                timestamps: VecDeque::new(),
                factor: 1.0,
                last_sampled: None,
            }),
        }
    }

    /// Convenience constructor for per-second budgets.
    pub fn per_second(capacity: usize) -> Self {
        Self::new(capacity, Duration::from_secs(1))
    }

    /// Enable adaptive capacity: effective capacity is scaled by a factor in
    /// [0.7, 1.3] derived from the sampler, refreshed at most every
    /// `sample_every`.
    pub fn with_sampler(mut self, sampler: Arc<dyn LoadSampler>, sample_every: Duration) -> Self {
        self.sampler = Some(sampler);
        self.sample_every = sample_every;
        self
    }

    /// Block until it is safe to issue one request.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();

                self.refresh_factor(&mut window, now);

                // Drop timestamps that have left the trailing window.
                while window
                    .timestamps
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.period)
                {
                    window.timestamps.pop_front();
                }

                let effective = self.effective_capacity(window.factor);
                if window.timestamps.len() < effective {
                    window.timestamps.push_back(now);
                    return;
                }

                // At capacity: wait until the oldest entry expires.
                match window.timestamps.front() {
                    Some(oldest) => (*oldest + self.period).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            if wait.is_zero() {
                // Capacity freed between the check and here; retry at once.
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// The capacity currently in effect, after adaptive scaling.
    pub async fn effective(&self) -> usize {
        let window = self.window.lock().await;
        self.effective_capacity(window.factor)
    }

    fn effective_capacity(&self, factor: f64) -> usize {
        // Epsilon before the floor so 6.999999… (float noise) counts as 7.
        (((self.capacity as f64 * factor) + 1e-9).floor() as usize).max(1)
    }

    fn refresh_factor(&self, window: &mut Window, now: Instant) {
        let Some(sampler) = &self.sampler else {
            return;
        };
        let stale = window
            .last_sampled
            .is_none_or(|t| now.duration_since(t) >= self.sample_every);
        if !stale {
            return;
        }
        window.last_sampled = Some(now);
        if let Some(load) = sampler.sample() {
            window.factor = load_to_factor(load);
            tracing::trace!(load, factor = window.factor, "rate limiter load sample");
        }
    }
}

/// Map normalized load to a capacity factor: wide (1.3×) under light load,
/// narrow (0.7×) when the host is saturated, linear in between.
fn load_to_factor(load: f64) -> f64 {
    let t = ((load - 0.5) / 0.5).clamp(0.0, 1.0);
    MAX_LOAD_FACTOR - t * (MAX_LOAD_FACTOR - MIN_LOAD_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLoad(f64);

    impl LoadSampler for FixedLoad {
        fn sample(&self) -> Option<f64> {
            Some(self.0)
        }
    }

    #[test]
    fn factor_is_bounded() {
        assert!((load_to_factor(0.0) - MAX_LOAD_FACTOR).abs() < 1e-9);
        assert!((load_to_factor(10.0) - MIN_LOAD_FACTOR).abs() < 1e-9);
        let mid = load_to_factor(0.75);
        assert!(mid > MIN_LOAD_FACTOR && mid < MAX_LOAD_FACTOR);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_is_immediate_under_capacity() {
        let limiter = SlidingWindowLimiter::per_second(3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_blocks_at_capacity() {
        let limiter = SlidingWindowLimiter::per_second(2);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        // Third dispatch must wait for the first timestamp to expire.
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn window_never_exceeds_bound() {
        let limiter = Arc::new(SlidingWindowLimiter::new(5, Duration::from_secs(1)));
        let dispatched = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            let dispatched = dispatched.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                dispatched.lock().await.push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = dispatched.lock().await.clone();
        times.sort();
        // Count dispatches in every trailing one-second window.
        for (i, t) in times.iter().enumerate() {
            let in_window = times[..=i]
                .iter()
                .filter(|other| t.duration_since(**other) < Duration::from_secs(1))
                .count();
            assert!(in_window <= 5, "{in_window} dispatches within one window");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn high_load_narrows_capacity() {
        let limiter = SlidingWindowLimiter::per_second(10)
            .with_sampler(Arc::new(FixedLoad(2.0)), Duration::from_secs(1));
        limiter.acquire().await;
        assert_eq!(limiter.effective().await, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn low_load_widens_capacity() {
        let limiter = SlidingWindowLimiter::per_second(10)
            .with_sampler(Arc::new(FixedLoad(0.1)), Duration::from_secs(1));
        limiter.acquire().await;
        assert_eq!(limiter.effective().await, 13);
    }
}
