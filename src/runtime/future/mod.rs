//! Single-assignment futures with context-checked continuations
//!
//! A [`Promise`] is the write side and a [`Future`] the read side of one
//! shared result slot. Continuations attached with [`Future::then`] and
//! [`Future::on_completion`] are scheduled onto an [`Apartment`] at the
//! priority of their [`ExecutionContext`], and only run when the context is
//! neither cancelled nor bound to an expired owner.
//!
//! [`Apartment`]: crate::runtime::apartment::Apartment

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::runtime::apartment::SharedApartment;
use crate::runtime::context::ExecutionContext;
use crate::runtime::error::{FlowError, FlowResult};

type Callback<T> = Box<dyn FnOnce(&FlowResult<T>) + Send + 'static>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Done(FlowResult<T>),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    done: Condvar,
}

impl<T> Shared<T>
where
    T: Clone + Send + 'static,
{
    fn pending() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Pending(Vec::new())),
            done: Condvar::new(),
        })
    }

    fn completed(result: FlowResult<T>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Done(result)),
            done: Condvar::new(),
        })
    }

    /// Store `result` and run the waiting callbacks outside the lock.
    fn complete(
        &self,
        result: FlowResult<T>,
    ) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Done(_) => return false,
                State::Pending(callbacks) => {
                    let callbacks = std::mem::take(callbacks);
                    *state = State::Done(result.clone());
                    callbacks
                }
            }
        };
        self.done.notify_all();
        for callback in callbacks {
            callback(&result);
        }
        true
    }

    fn subscribe(
        &self,
        callback: Callback<T>,
    ) {
        let result = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending(callbacks) => {
                    callbacks.push(callback);
                    return;
                }
                State::Done(result) => result.clone(),
            }
        };
        callback(&result);
    }

    fn try_result(&self) -> Option<FlowResult<T>> {
        match &*self.state.lock() {
            State::Pending(_) => None,
            State::Done(result) => Some(result.clone()),
        }
    }
}

/// Write side of a single-assignment result.
///
/// Dropping a promise that was never completed rejects its futures with a
/// cancellation error, so nothing waits on it forever.
pub struct Promise<T>
where
    T: Clone + Send + 'static,
{
    shared: Arc<Shared<T>>,
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Create an uncompleted promise.
    pub fn new() -> Self {
        Self {
            shared: Shared::pending(),
        }
    }

    /// A future observing this promise. Any number may be taken.
    #[inline]
    pub fn future(&self) -> Future<T> {
        Future {
            shared: self.shared.clone(),
        }
    }

    /// Complete with a value. Returns `false` if already completed.
    #[inline]
    pub fn resolve(
        &self,
        value: T,
    ) -> bool {
        self.complete(Ok(value))
    }

    /// Complete with an error. Returns `false` if already completed.
    #[inline]
    pub fn reject(
        &self,
        error: FlowError,
    ) -> bool {
        self.complete(Err(error))
    }

    /// Complete with `result`. Returns `false` if already completed.
    pub fn complete(
        &self,
        result: FlowResult<T>,
    ) -> bool {
        self.shared.complete(result)
    }

    /// Whether a result was stored.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.shared.try_result().is_some()
    }
}

impl<T> Default for Promise<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.shared
            .complete(Err(FlowError::cancelled("promise dropped before completion")));
    }
}

impl<T> std::fmt::Debug for Promise<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Read side of a single-assignment result.
pub struct Future<T>
where
    T: Clone + Send + 'static,
{
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Future<T>
where
    T: Clone + Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Future<T>
where
    T: Clone + Send + 'static,
{
    /// An already resolved future.
    pub fn ready(value: T) -> Self {
        Self {
            shared: Shared::completed(Ok(value)),
        }
    }

    /// An already rejected future.
    pub fn failed(error: FlowError) -> Self {
        Self {
            shared: Shared::completed(Err(error)),
        }
    }

    /// Whether the result is available.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.shared.try_result().is_some()
    }

    /// The result, if available.
    #[inline]
    pub fn try_result(&self) -> Option<FlowResult<T>> {
        self.shared.try_result()
    }

    /// Block until the result is available.
    pub fn wait(&self) -> FlowResult<T> {
        let mut state = self.shared.state.lock();
        loop {
            if let State::Done(result) = &*state {
                return result.clone();
            }
            self.shared.done.wait(&mut state);
        }
    }

    /// Block for at most `timeout`; `None` if the result is still missing.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<FlowResult<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let State::Done(result) = &*state {
                return Some(result.clone());
            }
            if self.shared.done.wait_until(&mut state, deadline).timed_out() {
                return match &*state {
                    State::Done(result) => Some(result.clone()),
                    State::Pending(_) => None,
                };
            }
        }
    }

    /// Run `f` with the value once it is available and return a future of
    /// its outcome.
    ///
    /// Errors skip `f` and propagate to the returned future. When the context
    /// is cancelled or its owner gone by the time `f` would run, the returned
    /// future is rejected with [`FlowError::Cancelled`]. A panic inside `f`
    /// rejects it with [`FlowError::Evaluation`].
    pub fn then<U, R, F>(
        &self,
        apartment: &SharedApartment,
        f: F,
        context: ExecutionContext,
    ) -> Future<U>
    where
        U: Clone + Send + 'static,
        R: IntoFlowFuture<U>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let promise = Promise::new();
        let derived = promise.future();
        let apartment = apartment.clone();

        self.shared.subscribe(Box::new(move |result: &FlowResult<T>| {
            let result = result.clone();
            let priority = context.priority();
            let run = move || {
                let value = match result {
                    Ok(value) => value,
                    Err(error) => {
                        promise.reject(error);
                        return;
                    }
                };
                let Some(lock) = context.enter() else {
                    warn!(%priority, "continuation skipped");
                    promise.reject(FlowError::cancelled(
                        "continuation skipped: context cancelled or owner expired",
                    ));
                    return;
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(move || f(value)));
                drop(lock);
                match outcome {
                    Ok(next) => next.into_flow_future().forward_to(promise),
                    Err(payload) => {
                        promise.reject(FlowError::evaluation(format_args!(
                            "continuation panicked: {}",
                            panic_message(payload.as_ref())
                        )));
                    }
                }
            };
            apartment.schedule(Box::new(run), priority);
        }));

        derived
    }

    /// Run `f` with the result, success or failure, once it is available.
    ///
    /// `f` is dropped without running when the context is cancelled or its
    /// owner gone at call time.
    pub fn on_completion<F>(
        &self,
        apartment: &SharedApartment,
        f: F,
        context: ExecutionContext,
    ) where
        F: FnOnce(FlowResult<T>) + Send + 'static,
    {
        let apartment = apartment.clone();
        self.shared.subscribe(Box::new(move |result: &FlowResult<T>| {
            let result = result.clone();
            let priority = context.priority();
            apartment.schedule(
                Box::new(move || {
                    let Some(_lock) = context.enter() else {
                        warn!(%priority, "completion handler skipped");
                        return;
                    };
                    f(result);
                }),
                priority,
            );
        }));
    }

    /// Complete `promise` with this future's result, synchronously.
    fn forward_to(
        &self,
        promise: Promise<T>,
    ) {
        self.shared.subscribe(Box::new(move |result: &FlowResult<T>| {
            promise.complete(result.clone());
        }));
    }
}

impl<T> std::fmt::Debug for Future<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Anything a continuation or evaluator may return.
pub trait IntoFlowFuture<T>
where
    T: Clone + Send + 'static,
{
    /// Convert into a future of `T`.
    fn into_flow_future(self) -> Future<T>;
}

impl<T> IntoFlowFuture<T> for Future<T>
where
    T: Clone + Send + 'static,
{
    #[inline]
    fn into_flow_future(self) -> Future<T> {
        self
    }
}

impl<T, E> IntoFlowFuture<T> for Result<T, E>
where
    T: Clone + Send + 'static,
    E: Into<FlowError>,
{
    fn into_flow_future(self) -> Future<T> {
        match self {
            Ok(value) => Future::ready(value),
            Err(error) => Future::failed(error.into()),
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
