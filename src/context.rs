use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::sync::Arc;

/// An execution-scoped collection of values.
///
/// A [`Context`] is a propagation mechanism which carries execution-scoped
/// values across API boundaries, most importantly the current [`Trace`] and
/// the current [`Span`]. It is passed by value through call chains; there is
/// no implicit thread-local "current" context.
///
/// [`Context`]s are immutable, and their write operations result in the
/// creation of a new context containing the original values and the new
/// specified values.
///
/// Values are keyed by type, so use application-specific types when storing
/// new context values to avoid unintentionally overwriting existing state.
///
/// # Examples
///
/// ```
/// use minit::Context;
///
/// // Application-specific `a` and `b` values
/// #[derive(Debug, PartialEq)]
/// struct ValueA(&'static str);
/// #[derive(Debug, PartialEq)]
/// struct ValueB(u64);
///
/// let cx = Context::new().with_value(ValueA("a"));
///
/// // Only value a has been set
/// assert_eq!(cx.get::<ValueA>(), Some(&ValueA("a")));
/// assert_eq!(cx.get::<ValueB>(), None);
///
/// // Deriving a new context leaves the original untouched
/// let cx2 = cx.with_value(ValueB(42));
/// assert_eq!(cx2.get::<ValueA>(), Some(&ValueA("a")));
/// assert_eq!(cx2.get::<ValueB>(), Some(&ValueB(42)));
/// assert_eq!(cx.get::<ValueB>(), None);
/// ```
///
/// [`Trace`]: crate::Trace
/// [`Span`]: crate::Span
#[derive(Clone, Default)]
pub struct Context {
    entries: HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>,
}

impl Context {
    /// Creates an empty `Context`.
    ///
    /// The context is initially created with a capacity of 0, so it will not
    /// allocate. Use [`with_value`] to create a new context that has entries.
    ///
    /// [`with_value`]: Context::with_value()
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns a reference to the entry for the corresponding value type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|rc| rc.downcast_ref())
    }

    /// Returns a copy of the context with the new value included.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut new_context = self.clone();
        new_context
            .entries
            .insert(TypeId::of::<T>(), Arc::new(value));

        new_context
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// With TypeIds as keys, there's no need to hash them. They are already
/// hashes themselves, coming from the compiler. The IdHasher holds the u64
/// of the TypeId, and then returns it, instead of doing any bit fiddling.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_contexts() {
        #[derive(Debug, PartialEq)]
        struct ValueA(&'static str);
        #[derive(Debug, PartialEq)]
        struct ValueB(u64);

        let outer = Context::new().with_value(ValueA("a"));

        // Only value `a` is set
        assert_eq!(outer.get(), Some(&ValueA("a")));
        assert_eq!(outer.get::<ValueB>(), None);

        // Both values visible in the derived context
        let inner = outer.with_value(ValueB(42));
        assert_eq!(inner.get(), Some(&ValueA("a")));
        assert_eq!(inner.get(), Some(&ValueB(42)));

        // The outer context is unchanged
        assert_eq!(outer.get::<ValueB>(), None);
    }

    #[test]
    fn with_value_overwrites_same_type() {
        #[derive(Debug, PartialEq)]
        struct Value(&'static str);

        let cx = Context::new().with_value(Value("first")).with_value(Value("second"));
        assert_eq!(cx.get(), Some(&Value("second")));
    }
}
