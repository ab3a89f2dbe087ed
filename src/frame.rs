//! The call-frame / environment stack (spec §3 "Frame / stack").
//!
//! Frame 0 is the global frame. Lookup reads the current frame and, on a
//! missing/`Undefined` slot, falls back to the global frame - there is no
//! general intermediate scope search, since captured environments make
//! one unnecessary.
use crate::symbol::Symbol;
use crate::value::Value;

/// Recursion like naive Fibonacci needs a deep call stack; this is the
/// spec's "depth >= 32K" floor.
pub const MAX_CALL_DEPTH: usize = 32_768;

#[derive(Debug, Default)]
pub struct Frame {
    slots: Vec<Option<Value>>,
}

impl Frame {
    fn get(&self, symbol: Symbol) -> Option<&Value> {
        self.slots.get(symbol.index())?.as_ref()
    }

    fn set(&mut self, symbol: Symbol, value: Value) {
        let index = symbol.index();
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(value);
    }
}

#[derive(Debug)]
pub struct FrameStack {
    frames: Vec<Frame>,
    /// Per-frame flag set by `print` (spec §4.3): once set, the frame's
    /// call must not write to, or be satisfied from, its function's
    /// memoization cache.
    suppress_cache: Vec<bool>,
}

impl FrameStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
            suppress_cache: vec![false],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a new call frame. Errs if doing so would exceed the depth
    /// limit.
    pub fn push(&mut self) -> Result<(), ()> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(());
        }
        self.frames.push(Frame::default());
        self.suppress_cache.push(false);
        Ok(())
    }

    pub fn pop(&mut self) {
        self.frames.pop();
        self.suppress_cache.pop();
    }

    /// Bind `symbol` in the current (topmost) frame.
    pub fn bind_local(&mut self, symbol: Symbol, value: Value) {
        self.frames
            .last_mut()
            .expect("frame stack is never empty")
            .set(symbol, value);
    }

    /// Read `symbol`: current frame first, falling back to the global
    /// frame.
    pub fn lookup(&self, symbol: Symbol) -> Option<&Value> {
        let current = self.frames.last().expect("frame stack is never empty");
        current.get(symbol).or_else(|| self.frames[0].get(symbol))
    }

    /// Overwrite `symbol`'s binding in whichever frame currently holds
    /// it (current, else global), for assignment. Returns `false` if the
    /// identifier is not bound anywhere.
    pub fn assign(&mut self, symbol: Symbol, value: Value) -> bool {
        let top = self.frames.len() - 1;
        if self.frames[top].get(symbol).is_some() {
            self.frames[top].set(symbol, value);
            true
        } else if top != 0 && self.frames[0].get(symbol).is_some() {
            self.frames[0].set(symbol, value);
            true
        } else {
            false
        }
    }

    /// Mark every frame currently on the stack as cache-suppressed; used
    /// when `print` executes (spec §4.3: printing is observable, so it
    /// disables memoization for the whole enclosing call chain).
    pub fn suppress_cache_for_call_chain(&mut self) {
        for flag in &mut self.suppress_cache {
            *flag = true;
        }
    }

    pub fn current_call_is_cache_suppressed(&self) -> bool {
        *self.suppress_cache.last().expect("frame stack is never empty")
    }

    /// Every occupied slot of the current (topmost) frame, by value - the
    /// environment a `fn` literal captures at definition time.
    pub fn snapshot_current(&self) -> Vec<(Symbol, Value)> {
        let current = self.frames.last().expect("frame stack is never empty");
        current
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref().map(|value| (Symbol::from_raw(index), value.clone()))
            })
            .collect()
    }

    /// Read `symbol` from the global frame only, bypassing the current
    /// frame. Used by the definition-time cache-eligibility scan to see
    /// whether a called name is already a known (and perhaps disqualified)
    /// closure.
    pub fn global(&self, symbol: Symbol) -> Option<&Value> {
        self.frames[0].get(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(index: u32) -> Symbol {
        // Symbol has no public constructor outside `SymbolTable`; tests
        // only need distinct, stable handles, which `SymbolTable` gives
        // us directly.
        let mut table = crate::symbol::SymbolTable::new();
        for _ in 0..index {
            table.fresh();
        }
        table.fresh()
    }

    #[test]
    fn lookup_falls_back_to_global() {
        let mut stack = FrameStack::new();
        let x = sym(0);
        stack.bind_local(x, Value::Integer(1));
        stack.push().unwrap();
        assert_eq!(stack.lookup(x).unwrap().as_integer(), Some(1));
    }

    #[test]
    fn local_shadows_global() {
        let mut stack = FrameStack::new();
        let x = sym(0);
        stack.bind_local(x, Value::Integer(1));
        stack.push().unwrap();
        stack.bind_local(x, Value::Integer(2));
        assert_eq!(stack.lookup(x).unwrap().as_integer(), Some(2));
        stack.pop();
        assert_eq!(stack.lookup(x).unwrap().as_integer(), Some(1));
    }

    #[test]
    fn assign_updates_existing_binding_in_place() {
        let mut stack = FrameStack::new();
        let x = sym(0);
        stack.bind_local(x, Value::Integer(1));
        assert!(stack.assign(x, Value::Integer(9)));
        assert_eq!(stack.lookup(x).unwrap().as_integer(), Some(9));
    }

    #[test]
    fn assign_to_unbound_identifier_fails() {
        let mut stack = FrameStack::new();
        let x = sym(0);
        assert!(!stack.assign(x, Value::Integer(9)));
    }
}
