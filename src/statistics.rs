//! RTT aggregation and the end-of-run summary.
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct Statistics {
    pub sent: u64,
    pub received: u64,
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    // Welford's online mean and variance, in microseconds.
    mean_rtt: f64,
    m2: f64,
    // RFC 3550-style smoothed RTT variation, in microseconds.
    jitter: f64,
    last_rtt: Option<Duration>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            sent: 0,
            received: 0,
            min_rtt: Duration::MAX,
            max_rtt: Duration::ZERO,
            mean_rtt: 0.0,
            m2: 0.0,
            jitter: 0.0,
            last_rtt: None,
            started_at: None,
            stopped_at: None,
        }
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_started(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.stopped_at = None;
    }

    pub(crate) fn mark_stopped(&mut self, now: Instant) {
        self.stopped_at = Some(now);
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Fold one RTT sample in.
    pub fn update(&mut self, rtt: Duration) {
        self.received += 1;
        self.min_rtt = self.min_rtt.min(rtt);
        self.max_rtt = self.max_rtt.max(rtt);

        let rtt_micros = rtt.as_micros() as f64;
        let delta = rtt_micros - self.mean_rtt;
        self.mean_rtt += delta / self.received as f64;
        let delta2 = rtt_micros - self.mean_rtt;
        self.m2 += delta * delta2;

        if let Some(last) = self.last_rtt {
            let diff = (rtt_micros - last.as_micros() as f64).abs();
            self.jitter += (diff - self.jitter) / 16.0;
        }
        self.last_rtt = Some(rtt);
    }

    pub fn avg_rtt(&self) -> Duration {
        Duration::from_micros(self.mean_rtt as u64)
    }

    /// Population standard deviation of the RTT samples.
    pub fn mdev(&self) -> Duration {
        if self.received < 2 {
            return Duration::ZERO;
        }
        let variance = self.m2 / self.received as f64;
        Duration::from_micros(variance.sqrt() as u64)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_micros(self.jitter as u64)
    }

    /// `(sent - received) * 100 / sent`, truncated; 0 when nothing was sent.
    pub fn loss_percent(&self) -> u64 {
        if self.sent == 0 {
            return 0;
        }
        self.sent.saturating_sub(self.received) * 100 / self.sent
    }

    /// Time between the last start and the last stop, or `now` while running.
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(started_at) => self
                .stopped_at
                .unwrap_or(now)
                .saturating_duration_since(started_at),
            None => Duration::ZERO,
        }
    }

    pub fn summary(&self, remote: Ipv4Addr, now: Instant) -> Summary {
        let rtt = (self.received > 0).then(|| RttSummary {
            min: self.min_rtt,
            avg: self.avg_rtt(),
            max: self.max_rtt,
            mdev: self.mdev(),
        });
        Summary {
            remote,
            transmitted: self.sent,
            received: self.received,
            loss_percent: self.loss_percent(),
            elapsed: self.elapsed(now),
            rtt,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct RttSummary {
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
    pub mdev: Duration,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Summary {
    pub remote: Ipv4Addr,
    pub transmitted: u64,
    pub received: u64,
    pub loss_percent: u64,
    pub elapsed: Duration,
    /// `None` when no reply was received.
    pub rtt: Option<RttSummary>,
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "--- {} statistics ---", self.remote)?;
        write!(
            f,
            "{} packets transmitted, {} received, {}% packet loss, time {}ms",
            self.transmitted,
            self.received,
            self.loss_percent,
            self.elapsed.as_millis()
        )?;
        if let Some(rtt) = &self.rtt {
            write!(
                f,
                "\nrtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
                millis(rtt.min),
                millis(rtt.avg),
                millis(rtt.max),
                millis(rtt.mdev)
            )?;
        }
        Ok(())
    }
}
