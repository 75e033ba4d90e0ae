//! AnyValue storage, observed through a counting allocator
//!
//! Counters are per thread so concurrently running tests do not disturb
//! each other.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use flowrt::runtime::value::AnyValue;

struct CountingAllocator;

thread_local! {
    static ALLOCATED: Cell<usize> = const { Cell::new(0) };
    static FREED: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(
        &self,
        layout: Layout,
    ) -> *mut u8 {
        let _ = ALLOCATED.try_with(|count| count.set(count.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(
        &self,
        ptr: *mut u8,
        layout: Layout,
    ) {
        let _ = FREED.try_with(|count| count.set(count.get() + 1));
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn allocated() -> usize {
    ALLOCATED.with(Cell::get)
}

fn freed() -> usize {
    FREED.with(Cell::get)
}

#[test]
fn test_word_sized_value_never_allocates() {
    let before = allocated();
    let value = AnyValue::new(4u32);
    let copy = value.clone();
    assert!(copy.is_inline());
    assert_eq!(*copy.get::<u32>(), 4);
    drop(value);
    drop(copy);
    assert_eq!(allocated(), before);
}

#[test]
fn test_boxed_value_allocates_once_and_frees_with_last_copy() {
    let (allocs, frees) = (allocated(), freed());

    let value = AnyValue::new([7u64; 4]);
    let copy = value.clone();
    assert!(!copy.is_inline());
    assert_eq!(allocated() - allocs, 1);

    drop(value);
    assert_eq!(freed() - frees, 0);
    assert_eq!(copy.get::<[u64; 4]>()[3], 7);

    drop(copy);
    assert_eq!(freed() - frees, 1);
}

#[test]
fn test_take_moves_without_allocating() {
    let mut value = AnyValue::new(String::from("payload"));
    let before = allocated();
    let taken = value.take();
    assert!(!value.has_value());
    assert_eq!(taken.get::<String>(), "payload");
    assert_eq!(allocated(), before);
}
