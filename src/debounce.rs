//! Timer-based coalescing of rapid inputs.
//!
//! Rapid field edits (the cafe-address box feeding the map lookup) should
//! trigger their side effect once per quiet period, not once per keystroke.
//! [`Debouncer`] queues the newest value and delivers it to the sink only
//! after no new input has arrived for the configured delay; every new input
//! cancels and re-arms the timer. Dropping the handle cancels anything still
//! pending.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

pub struct Debouncer<T> {
  tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
  pub fn new<F>(delay: Duration, sink: F) -> Self
  where
    F: Fn(T) + Send + 'static,
  {
    let (tx, mut rx) = mpsc::unbounded_channel::<T>();

    tokio::spawn(async move {
      // Outer loop: wait for the first input of a burst.
      while let Some(first) = rx.recv().await {
        let mut latest = first;
        let mut deadline = Instant::now() + delay;

        // Inner loop: keep re-arming until a full quiet period passes.
        loop {
          tokio::select! {
            next = rx.recv() => match next {
              Some(value) => {
                latest = value;
                deadline = Instant::now() + delay;
              }
              // Handle dropped mid-burst: the pending value is cancelled.
              None => return,
            },
            _ = tokio::time::sleep_until(deadline) => {
              sink(latest);
              break;
            }
          }
        }
      }
    });

    Self { tx }
  }

  /// Queue a value. It is delivered to the sink after the quiet period,
  /// unless a newer value supersedes it first.
  pub fn submit(&self, value: T) {
    // A send error means the task is gone, which only happens at shutdown.
    let _ = self.tx.send(value);
  }
}
