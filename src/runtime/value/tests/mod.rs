//! Tests for AnyValue
