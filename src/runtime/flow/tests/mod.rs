//! TaskFlow 单元测试
//!
//! Declaration parsing, leveling, execution and observers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::apartment::InlineApartment;
use crate::runtime::error::{FlowError, FlowResult};
use crate::runtime::flow::TaskFlow;
use crate::runtime::value::AnyValue;


type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

/// Flow whose tasks run on the calling thread.
fn inline_flow() -> TaskFlow {
    TaskFlow::with_apartment(InlineApartment::shared())
}

/// Evaluator producing `value`.
fn value_of(value: u32) -> impl FnOnce(AnyValue) -> FlowResult<AnyValue> + Send + 'static {
    move |_| Ok(AnyValue::new(value))
}

/// Evaluator appending `name` to `log` and producing an empty value.
fn record(
    log: &Log,
    name: &str,
) -> impl FnOnce(AnyValue) -> FlowResult<AnyValue> + Send + 'static {
    let log = log.clone();
    let name = name.to_string();
    move |_| {
        log.lock().push(name);
        Ok(AnyValue::empty())
    }
}

/// Evaluator failing with an evaluation error carrying `message`.
fn failing(message: &str) -> impl FnOnce(AnyValue) -> FlowResult<AnyValue> + Send + 'static {
    let message = message.to_string();
    move |_| Err(FlowError::evaluation(message))
}
