//! Apartment 单元测试

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel;
use parking_lot::Mutex;

use crate::runtime::apartment::{
    Apartment, InlineApartment, PriorityWorkQueue, ThreadPoolApartment, Work,
};
use crate::runtime::priority::Priority;

fn push_label(
    log: &Arc<Mutex<Vec<&'static str>>>,
    label: &'static str,
) -> Work {
    let log = log.clone();
    Box::new(move || log.lock().push(label))
}

#[cfg(test)]
mod queue_tests {
    use super::*;

    #[test]
    fn test_queue_serves_highest_level_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = PriorityWorkQueue::new();
        queue.push(push_label(&log, "low"), Priority::Low);
        queue.push(push_label(&log, "high-1"), Priority::High);
        queue.push(push_label(&log, "normal"), Priority::Normal);
        queue.push(push_label(&log, "high-2"), Priority::High);
        assert_eq!(queue.len(), 4);

        while let Some(work) = queue.pop() {
            work();
        }
        assert!(queue.is_empty());
        assert_eq!(*log.lock(), vec!["high-1", "high-2", "normal", "low"]);
    }
}

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[test]
    fn test_pool_runs_all_work() {
        let pool = ThreadPoolApartment::with_workers(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = channel::unbounded();

        for _ in 0..100 {
            let counter = counter.clone();
            let done_tx = done_tx.clone();
            pool.schedule(
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    done_tx.send(()).unwrap();
                }),
                Priority::Normal,
            );
        }
        for _ in 0..100 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(pool.stats().scheduled.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_pool_prefers_higher_priority() {
        let pool = ThreadPoolApartment::with_workers(1).unwrap();
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let (started_tx, started_rx) = channel::bounded::<()>(1);
        pool.schedule(
            Box::new(move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
            }),
            Priority::Normal,
        );
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        pool.schedule(push_label(&log, "low"), Priority::Low);
        pool.schedule(push_label(&log, "normal"), Priority::Normal);
        pool.schedule(push_label(&log, "critical"), Priority::Critical);
        pool.schedule(push_label(&log, "high"), Priority::High);
        assert_eq!(pool.queued(), 4);

        gate_tx.send(()).unwrap();
        pool.shutdown();
        assert_eq!(
            *log.lock(),
            vec!["critical", "high", "normal", "low"]
        );
    }

    #[test]
    fn test_pool_survives_panicking_work() {
        let pool = ThreadPoolApartment::with_workers(1).unwrap();
        let (tx, rx) = channel::unbounded();
        pool.schedule(Box::new(|| panic!("boom")), Priority::Normal);
        pool.schedule(Box::new(move || tx.send(7).unwrap()), Priority::Normal);

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
        pool.shutdown();
        assert_eq!(pool.stats().panicked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_shutdown_rejects_new_work() {
        let pool = ThreadPoolApartment::with_workers(2).unwrap();
        assert!(pool.is_running());
        pool.shutdown();
        assert!(!pool.is_running());

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        pool.schedule(
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            Priority::High,
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().scheduled.load(Ordering::SeqCst), 0);
    }
}

#[cfg(test)]
mod inline_tests {
    use super::*;

    #[test]
    fn test_inline_runs_immediately() {
        let log = Arc::new(Mutex::new(Vec::new()));
        InlineApartment.schedule(push_label(&log, "now"), Priority::Low);
        assert_eq!(*log.lock(), vec!["now"]);
    }

    #[test]
    fn test_inline_nested_work_runs_after_current_item() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let queued_inside = Arc::new(AtomicUsize::new(0));
        let (inner, queued) = (log.clone(), queued_inside.clone());
        InlineApartment.schedule(
            Box::new(move || {
                inner.lock().push("outer-start");
                InlineApartment.schedule(push_label(&inner, "nested"), Priority::Critical);
                queued.store(InlineApartment::queued(), Ordering::SeqCst);
                inner.lock().push("outer-end");
            }),
            Priority::Normal,
        );
        assert_eq!(*log.lock(), vec!["outer-start", "outer-end", "nested"]);
        assert_eq!(queued_inside.load(Ordering::SeqCst), 1);
        assert_eq!(InlineApartment::queued(), 0);
    }

    #[test]
    fn test_inline_deep_rescheduling_keeps_stack_flat() {
        fn step(
            remaining: usize,
            counter: Arc<AtomicUsize>,
        ) -> Work {
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                if remaining > 0 {
                    InlineApartment.schedule(step(remaining - 1, counter), Priority::Normal);
                }
            })
        }

        let counter = Arc::new(AtomicUsize::new(0));
        InlineApartment.schedule(step(100_000, counter.clone()), Priority::Normal);
        assert_eq!(counter.load(Ordering::SeqCst), 100_001);
    }

    #[test]
    fn test_inline_contains_panics() {
        InlineApartment.schedule(Box::new(|| panic!("inline boom")), Priority::Normal);
        let shared = InlineApartment::shared();
        let log = Arc::new(Mutex::new(Vec::new()));
        shared.schedule(push_label(&log, "after"), Priority::Normal);
        assert_eq!(*log.lock(), vec!["after"]);
    }
}
