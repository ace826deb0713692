//! Tracks per-`(ip,port)` controller health so the fan-out can skip an
//! endpoint that is actively failing instead of hammering it every frame.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Health state of one endpoint.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SenderState {
    /// Sends to this endpoint are currently attempted.
    Routable,
    /// A failure was reported; sends are skipped until `until` passes.
    Cooling {
        /// Instant at which this endpoint becomes routable again.
        until: Instant,
    },
}

#[derive(Clone, Debug)]
struct Entry {
    state: SenderState,
    last_success: Instant,
    last_error: Option<(Instant, String)>,
}

/// A point-in-time snapshot of one tracked endpoint, for the monitor HTTP surface.
#[derive(Clone, Debug)]
pub struct SenderStats {
    /// The endpoint this entry describes.
    pub addr: SocketAddr,
    /// Whether the endpoint is currently considered routable.
    pub routable: bool,
    /// Milliseconds since the last successful send.
    pub last_success_ms_ago: u64,
    /// The most recent reported error message, if any.
    pub last_error: Option<String>,
}

/// Frame-rate statistics derived from `report_frame()` calls over a rolling window.
#[derive(Copy, Clone, Debug)]
pub struct FrameRateStats {
    /// Frames per second measured over the rolling window.
    pub measured_fps: f64,
    /// The configured target frame rate.
    pub target_fps: u32,
    /// Number of ticks that missed their scheduled deadline.
    pub frame_misses: u64,
}

/// Sharded concurrent health tracker: one entry per `(ip,port)`, independently lockable.
pub struct SenderMonitor {
    entries: DashMap<SocketAddr, Entry>,
    cooldown: std::sync::RwLock<Duration>,
    frame_times: std::sync::Mutex<std::collections::VecDeque<Instant>>,
    target_fps: u32,
    frame_misses: std::sync::atomic::AtomicU64,
}

const FRAME_WINDOW: usize = 120;

impl SenderMonitor {
    /// Creates a monitor with the given cooldown duration and target frame rate.
    pub fn new(cooldown: Duration, target_fps: u32) -> Self {
        Self {
            entries: DashMap::new(),
            cooldown: std::sync::RwLock::new(cooldown),
            frame_times: std::sync::Mutex::new(std::collections::VecDeque::with_capacity(FRAME_WINDOW)),
            target_fps,
            frame_misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Registers an endpoint, initializing it as `Routable`.
    pub fn register(&self, addr: SocketAddr) {
        self.entries.entry(addr).or_insert_with(|| Entry {
            state: SenderState::Routable,
            last_success: Instant::now(),
            last_error: None,
        });
    }

    /// Replaces the cooldown duration applied to future failures.
    pub fn set_cooldown(&self, cooldown: Duration) {
        *self.cooldown.write().unwrap() = cooldown;
    }

    /// Records a successful send to `addr`.
    pub fn report_success(&self, addr: SocketAddr) {
        let now = Instant::now();
        let mut entry = self.entries.entry(addr).or_insert_with(|| Entry {
            state: SenderState::Routable,
            last_success: now,
            last_error: None,
        });
        entry.last_success = now;
        if let SenderState::Cooling { until } = entry.state {
            if now >= until {
                entry.state = SenderState::Routable;
            }
        }
    }

    /// Records a failed send to `addr`, starting (or restarting) its cooldown.
    pub fn report_failure(&self, addr: SocketAddr, err: impl ToString) {
        let now = Instant::now();
        let cooldown = *self.cooldown.read().unwrap();
        let mut entry = self.entries.entry(addr).or_insert_with(|| Entry {
            state: SenderState::Routable,
            last_success: now,
            last_error: None,
        });
        entry.state = SenderState::Cooling { until: now + cooldown };
        entry.last_error = Some((now, err.to_string()));
    }

    /// Whether `addr` should currently be attempted. Lazily self-transitions
    /// `Cooling -> Routable` once its cooldown has elapsed.
    pub fn is_routable(&self, addr: SocketAddr) -> bool {
        let Some(mut entry) = self.entries.get_mut(&addr) else {
            return true;
        };
        match entry.state {
            SenderState::Routable => true,
            SenderState::Cooling { until } => {
                if Instant::now() >= until {
                    entry.state = SenderState::Routable;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records that one render tick completed, advancing the frame-rate window.
    pub fn report_frame(&self) {
        let now = Instant::now();
        let mut times = self.frame_times.lock().unwrap();
        times.push_back(now);
        while times.len() > FRAME_WINDOW {
            times.pop_front();
        }
    }

    /// Records that a tick missed its scheduled deadline.
    pub fn report_frame_miss(&self) {
        self.frame_misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// A snapshot of every tracked endpoint's health, for the monitor HTTP surface.
    pub fn stats(&self) -> Vec<SenderStats> {
        let now = Instant::now();
        self.entries
            .iter()
            .map(|entry| SenderStats {
                addr: *entry.key(),
                routable: matches!(entry.state, SenderState::Routable)
                    || matches!(entry.state, SenderState::Cooling { until } if now >= until),
                last_success_ms_ago: now.saturating_duration_since(entry.last_success).as_millis() as u64,
                last_error: entry.last_error.as_ref().map(|(_, msg)| msg.clone()),
            })
            .collect()
    }

    /// Measured frame rate over the rolling window, plus the configured target and miss count.
    pub fn frame_rate(&self) -> FrameRateStats {
        let times = self.frame_times.lock().unwrap();
        let measured_fps = if times.len() >= 2 {
            let span = times.back().unwrap().duration_since(*times.front().unwrap()).as_secs_f64();
            if span > 0.0 {
                (times.len() - 1) as f64 / span
            } else {
                0.0
            }
        } else {
            0.0
        };
        FrameRateStats {
            measured_fps,
            target_fps: self.target_fps,
            frame_misses: self.frame_misses.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:6454".parse().unwrap()
    }

    #[test]
    fn unregistered_endpoint_is_routable_by_default() {
        let monitor = SenderMonitor::new(Duration::from_millis(50), 30);
        assert!(monitor.is_routable(addr()));
    }

    #[test]
    fn failure_then_success_within_cooldown_stays_cooling() {
        let monitor = SenderMonitor::new(Duration::from_secs(30), 30);
        monitor.report_failure(addr(), "boom");
        assert!(!monitor.is_routable(addr()));
        monitor.report_success(addr());
        assert!(!monitor.is_routable(addr()));
    }

    #[test]
    fn cooldown_expiry_restores_routability() {
        let monitor = SenderMonitor::new(Duration::from_millis(10), 30);
        monitor.report_failure(addr(), "boom");
        assert!(!monitor.is_routable(addr()));
        std::thread::sleep(Duration::from_millis(25));
        assert!(monitor.is_routable(addr()));
    }

    #[test]
    fn stats_reports_last_error() {
        let monitor = SenderMonitor::new(Duration::from_secs(30), 30);
        monitor.report_failure(addr(), "connection refused");
        let stats = monitor.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].last_error.as_deref(), Some("connection refused"));
        assert!(!stats[0].routable);
    }

    #[test]
    fn frame_rate_is_zero_with_fewer_than_two_samples() {
        let monitor = SenderMonitor::new(Duration::from_secs(30), 30);
        monitor.report_frame();
        assert_eq!(monitor.frame_rate().measured_fps, 0.0);
    }
}
