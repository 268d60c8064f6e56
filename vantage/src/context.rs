//! Execution-scoped value propagation.
//!
//! A [`Context`] is an immutable bag of values that flows with the current
//! unit of execution. Cross-cutting concerns (the active span, baggage,
//! application state) read and extend the same shared context instead of
//! threading parameters through every call.
//!
//! The current context is kept in a thread-local stack. [`Context::attach`]
//! makes a context current and returns a [`ContextGuard`]; dropping the
//! guard on any exit path restores the previous context, so attaches nest
//! correctly even when guards are dropped out of order.

use crate::sdk_warn;
use crate::trace::SpanContext;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

type EntryMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// An immutable, execution-scoped collection of values.
///
/// Write operations return a new context; existing contexts are never
/// mutated, so snapshots are safe to share across threads.
///
/// # Examples
///
/// ```
/// use vantage::Context;
///
/// #[derive(Debug, PartialEq)]
/// struct Tenant(&'static str);
///
/// let cx = Context::new().with_value(Tenant("edge"));
/// {
///     let _guard = cx.attach();
///     assert_eq!(Context::current().get::<Tenant>(), Some(&Tenant("edge")));
/// }
/// assert_eq!(Context::current().get::<Tenant>(), None);
/// ```
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span_context: Option<Arc<SpanContext>>,
    entries: Option<Arc<EntryMap>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns a snapshot of this thread's current context.
    pub fn current() -> Self {
        Self::map_current(|cx| cx.clone())
    }

    /// Applies `f` to the current context without cloning it.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|stack| f(&stack.borrow().current))
    }

    /// Returns a clone of the current context with `value` added.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        Self::map_current(|cx| cx.with_value(value))
    }

    /// Returns the entry stored for the value type `T`, if any.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .as_ref()?
            .get(&TypeId::of::<T>())?
            .downcast_ref()
    }

    /// Returns a copy of this context with `value` included.
    ///
    /// Values are keyed by type; storing a second value of the same type
    /// replaces the first.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut entries = self
            .entries
            .as_deref()
            .cloned()
            .unwrap_or_default();
        entries.insert(TypeId::of::<T>(), Arc::new(value));
        Context {
            span_context: self.span_context.clone(),
            entries: Some(Arc::new(entries)),
        }
    }

    /// Returns a copy of this context using `span_context` as the active
    /// span context.
    pub fn with_span_context(&self, span_context: SpanContext) -> Self {
        Context {
            span_context: Some(Arc::new(span_context)),
            entries: self.entries.clone(),
        }
    }

    /// Returns a copy of the current context using `span_context` as the
    /// active span context, marked as arriving from a remote process.
    pub fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        self.with_span_context(span_context.with_remote(true))
    }

    /// The active [`SpanContext`], if one has been set.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span_context.as_deref()
    }

    /// Returns true if an active span context has been set.
    pub fn has_active_span(&self) -> bool {
        self.span_context.is_some()
    }

    /// Makes this context the current context of this thread.
    ///
    /// The returned guard restores the previous context when dropped. Bind
    /// the guard to a named variable; `let _ = cx.attach()` drops it
    /// immediately.
    pub fn attach(self) -> ContextGuard {
        let pos = CURRENT_CONTEXT.with(|stack| stack.borrow_mut().push(self));
        ContextGuard {
            pos,
            _not_send: PhantomData,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("span_context", &self.span_context)
            .field(
                "entries",
                &self.entries.as_ref().map_or(0, |entries| entries.len()),
            )
            .finish()
    }
}

/// A guard that resets the current context to the prior context when
/// dropped.
#[derive(Debug)]
pub struct ContextGuard {
    pos: usize,
    // Guards hold positions into a thread-local stack and must not move to
    // another thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.pos != ContextStack::INVALID_POS {
            CURRENT_CONTEXT.with(|stack| stack.borrow_mut().pop(self.pos));
        }
    }
}

/// Tracks the contexts attached to this thread.
///
/// Guards may be dropped out of order; popping a non-top position simply
/// clears that slot, and the restore happens once the slots above it have
/// drained.
struct ContextStack {
    current: Context,
    saved: Vec<Option<Context>>,
}

impl ContextStack {
    const INVALID_POS: usize = usize::MAX;
    const MAX_DEPTH: usize = u16::MAX as usize;

    fn push(&mut self, cx: Context) -> usize {
        if self.saved.len() >= Self::MAX_DEPTH {
            sdk_warn!(
                name: "Context.AttachFailed",
                message = "too many nested context attaches; the current context is unchanged"
            );
            return Self::INVALID_POS;
        }
        let prev = std::mem::replace(&mut self.current, cx);
        self.saved.push(Some(prev));
        self.saved.len()
    }

    fn pop(&mut self, pos: usize) {
        if pos == 0 || pos > self.saved.len() {
            sdk_warn!(
                name: "Context.DetachOutOfBounds",
                position = pos,
                stack_depth = self.saved.len()
            );
            return;
        }
        if pos == self.saved.len() {
            // Skip over slots already cleared by out-of-order drops.
            while matches!(self.saved.last(), Some(None)) {
                self.saved.pop();
            }
            if let Some(Some(prev)) = self.saved.pop() {
                self.current = prev;
            }
        } else {
            self.saved[pos - 1] = None;
        }
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current: Context::default(),
            saved: Vec::with_capacity(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

    #[derive(Debug, PartialEq)]
    struct ValueA(u64);
    #[derive(Debug, PartialEq)]
    struct ValueB(&'static str);

    #[test]
    fn nested_attach_restores_previous() {
        let _outer = Context::new().with_value(ValueA(1)).attach();
        assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(1)));
        {
            let _inner = Context::current_with_value(ValueB("b")).attach();
            assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(1)));
            assert_eq!(Context::current().get::<ValueB>(), Some(&ValueB("b")));
        }
        assert_eq!(Context::current().get::<ValueB>(), None);
    }

    #[test]
    fn out_of_order_drop() {
        let cx_a = Context::new().with_value(ValueA(1));
        let cx_b = Context::new().with_value(ValueA(2));
        let guard_a = cx_a.attach();
        let guard_b = cx_b.attach();
        assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(2)));
        drop(guard_a);
        // Dropping the outer guard first leaves the top context current.
        assert_eq!(Context::current().get::<ValueA>(), Some(&ValueA(2)));
        drop(guard_b);
        assert_eq!(Context::current().get::<ValueA>(), None);
    }

    #[test]
    fn span_context_is_carried() {
        let sc = SpanContext::new(
            TraceId::from_u128(1),
            SpanId::from_u64(2),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let cx = Context::new().with_span_context(sc.clone());
        assert_eq!(cx.span_context(), Some(&sc));
        assert!(cx.has_active_span());

        let remote = Context::new().with_remote_span_context(sc);
        assert!(remote.span_context().unwrap().is_remote());
    }
}
