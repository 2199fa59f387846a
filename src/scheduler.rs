//! Event scheduling on top of the tokio runtime.
//!
//! Every event for a probe goes through one unbounded channel, consumed by a
//! single loop, so handlers never run concurrently. Timers are tasks racing a
//! sleep against a [`CancellationToken`].
use std::time::Duration;

use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub(crate) enum Event {
    /// Fire the send scheduled under this timer id.
    Send(u64),
    Frame(Vec<u8>),
    Stop,
}

/// Handle to a scheduled event.
///
/// Dropping the handle does not cancel the event.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Scheduler {
    events: mpsc::UnboundedSender<Event>,
}

impl Scheduler {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }

    pub(crate) fn now(&self) -> Instant {
        Instant::now()
    }

    /// Must be called from within a tokio runtime.
    pub(crate) fn schedule_after(&self, delay: Duration, event: Event) -> TimerHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let events = self.events.clone();
        let deadline = Instant::now() + delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {},
                _ = tokio::time::sleep_until(deadline) => {
                    // The receiver is gone once the probe is dropped.
                    let _ = events.send(event);
                }
            }
        });
        TimerHandle { token }
    }

    /// Queue `event` behind the events already pending.
    pub(crate) fn schedule_now(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_fires_once_delay_elapsed() {
        let (scheduler, mut events) = Scheduler::new();
        let start = scheduler.now();
        let _handle = scheduler.schedule_after(Duration::from_millis(250), Event::Send(7));

        match events.recv().await {
            Some(Event::Send(7)) => {}
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(scheduler.now() - start, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (scheduler, mut events) = Scheduler::new();
        let handle = scheduler.schedule_after(Duration::from_secs(1), Event::Send(1));
        handle.cancel();
        assert!(handle.is_cancelled());

        scheduler.schedule_after(Duration::from_secs(2), Event::Stop);
        match events.recv().await {
            Some(Event::Stop) => {}
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_schedule_now_keeps_order() {
        let (scheduler, mut events) = Scheduler::new();
        scheduler.schedule_now(Event::Frame(vec![1]));
        scheduler.schedule_now(Event::Stop);
        assert!(matches!(events.recv().await, Some(Event::Frame(_))));
        assert!(matches!(events.recv().await, Some(Event::Stop)));
    }
}
