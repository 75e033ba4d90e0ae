//! Type-erased value container
//!
//! `AnyValue` carries exactly one value of a type chosen at construction and
//! hands it back only as that exact type. Storage is selected per concrete
//! type:
//! - word-sized values without drop glue live inline (no allocation, copies
//!   duplicate the word)
//! - everything else is boxed behind an `Arc` shared by all copies and
//!   destroyed when the last copy drops
//!
//! Inline copies are bitwise, so each copy owns its own word. A word-sized
//! type with interior mutability (`AtomicUsize`, `Cell<u32>`) therefore does
//! not share state across copies when built with [`AnyValue::new`]; use
//! [`AnyValue::shared`] when copies must observe each other's writes.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::mem::{self, MaybeUninit};
use std::sync::Arc;

/// Inline slot: one machine word, aligned like `usize`.
type Word = MaybeUninit<usize>;

#[derive(Clone, Default)]
enum Storage {
    #[default]
    Empty,
    Inline {
        word: Word,
        type_id: TypeId,
        type_name: &'static str,
    },
    Boxed {
        cell: Arc<dyn Any + Send + Sync>,
        type_name: &'static str,
    },
}

/// A copyable container holding one value of an arbitrary type.
///
/// # Examples
///
/// ```
/// use flowrt::runtime::value::AnyValue;
///
/// let v = AnyValue::of::<u64>(7u8);
/// assert!(v.is_inline());
/// assert_eq!(*v.get::<u64>(), 7);
/// assert!(v.try_get::<u8>().is_none());
/// ```
#[derive(Clone, Default)]
pub struct AnyValue {
    storage: Storage,
}

/// Whether `T` is stored inline.
///
/// Only size, alignment and drop glue are checked. Interior mutability is
/// not detected, see [`AnyValue::shared`].
#[inline]
pub const fn fits_inline<T>() -> bool {
    mem::size_of::<T>() <= mem::size_of::<usize>()
        && mem::align_of::<T>() <= mem::align_of::<usize>()
        && !mem::needs_drop::<T>()
}

impl AnyValue {
    /// An empty container.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            storage: Storage::Empty,
        }
    }

    /// Store `value` as exactly `T`.
    pub fn new<T>(value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        let type_name = type_name::<T>();
        if fits_inline::<T>() {
            let mut word = Word::uninit();
            // SAFETY: `fits_inline` guarantees `T` fits in the word and needs
            // at most word alignment. `T` has no drop glue, so forgetting the
            // bytes later never leaks a resource.
            unsafe { word.as_mut_ptr().cast::<T>().write(value) };
            Self {
                storage: Storage::Inline {
                    word,
                    type_id: TypeId::of::<T>(),
                    type_name,
                },
            }
        } else {
            Self {
                storage: Storage::Boxed {
                    cell: Arc::new(value),
                    type_name,
                },
            }
        }
    }

    /// Store `value` as exactly `T`, always boxed so every copy refers to the
    /// same instance.
    ///
    /// ```
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use flowrt::runtime::value::AnyValue;
    ///
    /// let hits = AnyValue::shared(AtomicUsize::new(0));
    /// let copy = hits.clone();
    /// copy.get::<AtomicUsize>().fetch_add(1, Ordering::SeqCst);
    /// assert_eq!(hits.get::<AtomicUsize>().load(Ordering::SeqCst), 1);
    /// ```
    pub fn shared<T>(value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self {
            storage: Storage::Boxed {
                cell: Arc::new(value),
                type_name: type_name::<T>(),
            },
        }
    }

    /// Store a value of exactly `T` built from any convertible argument.
    #[inline]
    pub fn of<T>(value: impl Into<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::new::<T>(value.into())
    }

    /// Whether a value is stored.
    #[inline]
    pub fn has_value(&self) -> bool {
        !matches!(self.storage, Storage::Empty)
    }

    /// Whether the stored value lives inline (no heap allocation).
    #[inline]
    pub fn is_inline(&self) -> bool {
        matches!(self.storage, Storage::Inline { .. })
    }

    /// Name of the stored type, `"<empty>"` when nothing is stored.
    pub fn type_name(&self) -> &'static str {
        match &self.storage {
            Storage::Empty => "<empty>",
            Storage::Inline { type_name, .. } | Storage::Boxed { type_name, .. } => type_name,
        }
    }

    /// Whether the stored value is exactly `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.try_get::<T>().is_some()
    }

    /// Borrow the stored value if it is exactly `T`.
    pub fn try_get<T: 'static>(&self) -> Option<&T> {
        match &self.storage {
            Storage::Empty => None,
            Storage::Inline { word, type_id, .. } => {
                if *type_id != TypeId::of::<T>() {
                    return None;
                }
                // SAFETY: the word was written as a `T` in `new` and the type
                // id matches.
                Some(unsafe { &*word.as_ptr().cast::<T>() })
            }
            Storage::Boxed { cell, .. } => (**cell).downcast_ref::<T>(),
        }
    }

    /// Borrow the stored value.
    ///
    /// # Panics
    ///
    /// Retrieving with a type other than the one stored, or from an empty
    /// container, is a contract violation.
    pub fn get<T: 'static>(&self) -> &T {
        match self.try_get::<T>() {
            Some(value) => value,
            None => panic!(
                "AnyValue holds `{}`, requested `{}`",
                self.type_name(),
                type_name::<T>()
            ),
        }
    }

    /// Clone the stored value out if it is exactly `T`.
    #[inline]
    pub fn cloned<T: Clone + 'static>(&self) -> Option<T> {
        self.try_get::<T>().cloned()
    }

    /// Move the value out, leaving this container empty.
    #[inline]
    pub fn take(&mut self) -> AnyValue {
        mem::take(self)
    }

    /// Drop the stored value.
    #[inline]
    pub fn reset(&mut self) {
        self.storage = Storage::Empty;
    }

    /// Number of containers sharing a boxed value; `0` when inline or empty.
    pub(crate) fn share_count(&self) -> usize {
        match &self.storage {
            Storage::Boxed { cell, .. } => Arc::strong_count(cell),
            _ => 0,
        }
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.storage {
            Storage::Empty => f.write_str("AnyValue(<empty>)"),
            Storage::Inline { type_name, .. } => write!(f, "AnyValue(inline {})", type_name),
            Storage::Boxed { type_name, .. } => write!(f, "AnyValue(boxed {})", type_name),
        }
    }
}
