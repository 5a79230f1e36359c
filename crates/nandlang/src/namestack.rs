//! Lexical scoping and stack-slot allocation for a single function body.
//!
//! Grounded on `original_source/src/namestack.h`/`.cpp`'s `NameStack`, which
//! chains one frame object per nested block and walks the parent pointer on
//! lookup. Nandlang has no nested function declarations, so every name
//! visible inside one function lives in the same flat slot space; what
//! varies block to block is only which names are *visible*. That lets this
//! port collapse the original's chain of heap-allocated frame objects into
//! a single `Vec` of scopes sharing one slot counter, which incidentally
//! fixes a bug in the original: `getPositionIndexed` there only bounds-checks
//! an array access against the size recorded in the frame that declared the
//! name, then recurses into the parent frame through the unindexed
//! `getPosition` and skips the check entirely once it crosses a frame
//! boundary. Here there is only one size recorded per binding and exactly
//! one place that checks it (see [`NameStack::lookup`]'s caller in
//! `parser.rs`), so the bug has no room to exist.

use std::rc::Rc;

/// Sentinel slot used for the `_` discard target. Never a real stack index:
/// `usize::MAX` can't be reached by any real frame, so using it instead of
/// `Option<usize>` keeps `AssignTarget::Variable`'s slot field a plain
/// `usize` everywhere else.
pub const IGNORE_SLOT: usize = usize::MAX;

struct Binding {
    name: Rc<str>,
    slot: usize,
    size: usize,
}

/// Per-function name resolver. Call [`NameStack::reset`] at the start of
/// each function, [`NameStack::push_scope`]/[`NameStack::pop_scope`] around
/// each nested block (`if`, `while`, `for`), and [`NameStack::declare`] for
/// every `var` and every input/output parameter.
#[derive(Default)]
pub struct NameStack {
    scopes: Vec<Vec<Binding>>,
    next_slot: usize,
    high_water: usize,
}

impl NameStack {
    pub fn new() -> Self {
        NameStack::default()
    }

    /// Discard all scopes and slot state, starting a fresh function frame.
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.scopes.push(Vec::new());
        self.next_slot = 0;
        self.high_water = 0;
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Allocate `size` contiguous slots for `name`, shadowing any binding of
    /// the same name visible in an outer scope.
    pub fn declare(&mut self, name: &str, size: usize) -> usize {
        let slot = self.next_slot;
        self.next_slot += size.max(1);
        self.high_water = self.high_water.max(self.next_slot);
        self.scopes
            .last_mut()
            .expect("reset() must be called before declare()")
            .push(Binding {
                name: Rc::from(name),
                slot,
                size: size.max(1),
            });
        slot
    }

    /// Resolve a name to `(slot, size)`, searching innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<(usize, usize)> {
        for scope in self.scopes.iter().rev() {
            for binding in scope.iter().rev() {
                if &*binding.name == name {
                    return Some((binding.slot, binding.size));
                }
            }
        }
        None
    }

    /// Total slots needed by the function whose body has been walked so far.
    pub fn frame_size(&self) -> usize {
        self.high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_allocate_increasing_slots() {
        let mut ns = NameStack::new();
        ns.reset();
        assert_eq!(ns.declare("a", 1), 0);
        assert_eq!(ns.declare("b", 4), 1);
        assert_eq!(ns.declare("c", 1), 5);
        assert_eq!(ns.frame_size(), 6);
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut ns = NameStack::new();
        ns.reset();
        ns.declare("x", 1);
        ns.push_scope();
        let inner = ns.declare("x", 1);
        assert_eq!(ns.lookup("x"), Some((inner, 1)));
        ns.pop_scope();
        assert_eq!(ns.lookup("x"), Some((0, 1)));
    }

    #[test]
    fn unknown_name_is_none() {
        let mut ns = NameStack::new();
        ns.reset();
        assert_eq!(ns.lookup("nope"), None);
    }

    #[test]
    fn reset_clears_previous_function_frame() {
        let mut ns = NameStack::new();
        ns.reset();
        ns.declare("a", 3);
        ns.reset();
        assert_eq!(ns.lookup("a"), None);
        assert_eq!(ns.frame_size(), 0);
    }
}
