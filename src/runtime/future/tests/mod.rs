//! Future / Promise 单元测试

use std::sync::Arc;

use parking_lot::Mutex;
use std::thread;
use std::time::Duration;

use crate::runtime::apartment::{InlineApartment, SharedApartment, ThreadPoolApartment};
use crate::runtime::context::ExecutionContext;
use crate::runtime::controller::Controller;
use crate::runtime::error::{FlowError, FlowResult};
use crate::runtime::future::{Future, Promise};

fn inline() -> SharedApartment {
    InlineApartment::shared()
}

#[cfg(test)]
mod promise_tests {
    use super::*;

    #[test]
    fn test_resolve_only_once() {
        let promise = Promise::new();
        let future = promise.future();
        assert!(!future.is_ready());

        assert!(promise.resolve(1u32));
        assert!(!promise.resolve(2));
        assert!(!promise.reject(FlowError::cancelled("late")));
        assert_eq!(future.wait().unwrap(), 1);
        assert!(promise.is_completed());
    }

    #[test]
    fn test_dropped_promise_rejects() {
        let promise = Promise::<u32>::new();
        let future = promise.future();
        drop(promise);
        let error = future.wait().unwrap_err();
        assert!(error.is_cancellation());
    }

    #[test]
    fn test_wait_across_threads() {
        let promise = Promise::new();
        let future = promise.future();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.resolve(String::from("done"));
        });
        assert_eq!(future.wait().unwrap(), "done");
        producer.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let promise = Promise::<u8>::new();
        let future = promise.future();
        assert!(future.wait_timeout(Duration::from_millis(10)).is_none());
        promise.resolve(3);
        assert_eq!(
            future.wait_timeout(Duration::from_millis(10)).unwrap().unwrap(),
            3
        );
    }
}

#[cfg(test)]
mod continuation_tests {
    use super::*;

    #[test]
    fn test_then_chains_values() {
        let apartment = inline();
        let doubled = Future::ready(21u32).then(
            &apartment,
            |v| Ok::<_, FlowError>(v * 2),
            ExecutionContext::new(),
        );
        assert_eq!(doubled.try_result().unwrap().unwrap(), 42);
    }

    #[test]
    fn test_then_accepts_future_result() {
        let apartment = inline();
        let inner = Promise::new();
        let inner_future = inner.future();
        let chained = Future::ready(()).then(
            &apartment,
            move |()| inner_future,
            ExecutionContext::new(),
        );
        assert!(!chained.is_ready());
        inner.resolve(String::from("late"));
        assert_eq!(chained.wait().unwrap(), "late");
    }

    #[test]
    fn test_error_skips_continuation() {
        let apartment = inline();
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let derived = Future::<u32>::failed(FlowError::validation("bad")).then(
            &apartment,
            move |v| {
                *flag.lock() = true;
                Ok::<_, FlowError>(v)
            },
            ExecutionContext::new(),
        );
        assert!(matches!(derived.wait(), Err(FlowError::Validation(_))));
        assert!(!*ran.lock());
    }

    #[test]
    fn test_cancelled_context_rejects_derived() {
        let apartment = inline();
        let controller = Controller::new();
        let context = ExecutionContext::new().with_controller(&controller);
        let promise = Promise::new();
        let derived = promise.future().then(
            &apartment,
            |v: u32| Ok::<_, FlowError>(v + 1),
            context,
        );

        controller.cancel();
        promise.resolve(1);
        assert!(derived.wait().unwrap_err().is_cancellation());
    }

    #[test]
    fn test_expired_owner_skips_completion_handler() {
        let apartment = inline();
        let owner = Arc::new(0u8);
        let context = ExecutionContext::new().with_weak_owner(&owner);
        let seen: Arc<Mutex<Vec<FlowResult<u32>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let promise = Promise::new();
        promise.future().on_completion(
            &apartment,
            move |result| sink.lock().push(result),
            context,
        );
        drop(owner);
        promise.resolve(5);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_panic_in_continuation_becomes_evaluation_error() {
        let apartment = inline();
        let derived: Future<u32> = Future::ready(1u32).then(
            &apartment,
            |_| -> FlowResult<u32> { panic!("kaboom") },
            ExecutionContext::new(),
        );
        match derived.wait() {
            Err(FlowError::Evaluation(error)) => {
                assert!(error.to_string().contains("kaboom"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_continuation_runs_on_pool() {
        let pool: SharedApartment = Arc::new(ThreadPoolApartment::with_workers(2).unwrap());
        let promise = Promise::new();
        let derived = promise.future().then(
            &pool,
            |v: u64| Ok::<_, FlowError>(thread::current().name().map(str::to_owned).map(|n| (n, v))),
            ExecutionContext::new(),
        );
        promise.resolve(9);
        let (name, value) = derived.wait().unwrap().unwrap();
        assert!(name.starts_with("flowrt-worker"));
        assert_eq!(value, 9);
    }
}
