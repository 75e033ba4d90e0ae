//! Type-erased values carried across asynchronous boundaries
//!
//! Task results, trigger arguments and user data all travel as
//! [`AnyValue`](any_value::AnyValue).

pub mod any_value;
pub use any_value::*;

#[cfg(test)]
mod tests;
