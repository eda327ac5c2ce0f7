//! Fixed-rate driver for the exporter's periodic tasks.
//!
//! Cycles run one at a time: a slow cycle delays the next tick instead of
//! overlapping with it, and ticks missed meanwhile are skipped. A cycle in
//! flight is abandoned when shutdown fires. A panicking cycle is logged and
//! the schedule continues.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

/// Work repeated on a fixed interval.
#[async_trait]
pub trait PeriodicTask: Send {
    fn name(&self) -> &'static str;

    /// One cycle. Errors are reported inside; the schedule never stops on them.
    async fn run_cycle(&mut self);
}

/// Drive `task` every `period` until the shutdown channel fires. The first
/// cycle runs immediately.
pub async fn run_periodic<T: PeriodicTask>(
    mut task: T,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let name = task.name();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::info!(task = name, "task shutting down");
                break;
            }
            _ = interval.tick() => {}
        }

        let cycle = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::info!(task = name, "task shutting down, cycle abandoned");
                break;
            }
            cycle = AssertUnwindSafe(task.run_cycle()).catch_unwind() => cycle,
        };
        if let Err(panic) = cycle {
            tracing::error!(task = name, "cycle panicked: {}", panic_message(panic.as_ref()));
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    struct Counter {
        runs: Arc<AtomicUsize>,
        panic_on_first: bool,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn run_cycle(&mut self) {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_first && run == 0 {
                panic!("first cycle fails");
            }
        }
    }

    /// Cycles that take `cycle_time`, recording how many ran at once.
    struct Slow {
        cycle_time: Duration,
        started: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Slow {
        fn new(cycle_time: Duration) -> Self {
            Self {
                cycle_time,
                started: Arc::new(AtomicUsize::new(0)),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl PeriodicTask for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn run_cycle(&mut self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.cycle_time).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn wait_for(count: &AtomicUsize, at_least: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while count.load(Ordering::SeqCst) < at_least {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cycles did not run in time");
    }

    #[tokio::test]
    async fn runs_until_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = broadcast::channel(1);
        let task = Counter { runs: Arc::clone(&runs), panic_on_first: false };
        let handle = tokio::spawn(run_periodic(task, Duration::from_millis(10), rx));

        wait_for(&runs, 2).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn panicking_cycle_does_not_stop_the_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = broadcast::channel(1);
        let task = Counter { runs: Arc::clone(&runs), panic_on_first: true };
        let handle = tokio::spawn(run_periodic(task, Duration::from_millis(10), rx));

        wait_for(&runs, 2).await;
        tx.send(()).unwrap();
        handle.await.expect("schedule task must survive a panicking cycle");
    }

    #[tokio::test]
    async fn slow_cycles_never_overlap() {
        let cycle_time = Duration::from_millis(40);
        let task = Slow::new(cycle_time);
        let started = Arc::clone(&task.started);
        let max_in_flight = Arc::clone(&task.max_in_flight);
        let (tx, rx) = broadcast::channel(1);

        let begin = Instant::now();
        let handle = tokio::spawn(run_periodic(task, Duration::from_millis(5), rx));
        wait_for(&started, 4).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
        let elapsed = begin.elapsed();

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        let bound = (elapsed.as_millis() / cycle_time.as_millis()) as usize + 1;
        assert!(started.load(Ordering::SeqCst) <= bound);
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_cycle_in_flight() {
        let task = Slow::new(Duration::from_secs(60));
        let started = Arc::clone(&task.started);
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_periodic(task, Duration::from_millis(5), rx));

        wait_for(&started, 1).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("shutdown waited for the cycle")
            .unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extracts_panic_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }
}
