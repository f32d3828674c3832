//! Stand-in for the native stack compiled code would otherwise spill roots
//! onto.
//!
//! There is no code generator in this crate, so nothing ever actually
//! pushes a return address or a spilled register onto a real `rsp`. Callers
//! of the runtime ABI instead push the `Value`s they need to keep alive
//! across an allocation here, record the index as `stack_top`, and the
//! collector scans everything from that index to the current length.

use super::value::Value;

pub struct RootStack {
    slots: Vec<Value>,
}

impl RootStack {
    pub fn new() -> RootStack {
        RootStack { slots: Vec::new() }
    }

    /// Current length: the position a later `collect_garbage` call should
    /// scan up to if a caller captured this as its own `stack_top` earlier.
    pub fn mark(&self) -> usize {
        self.slots.len()
    }

    pub fn push(&mut self, v: Value) -> usize {
        self.slots.push(v);
        self.slots.len() - 1
    }

    pub fn get(&self, i: usize) -> Value {
        self.slots[i]
    }

    pub fn set(&mut self, i: usize, v: Value) {
        self.slots[i] = v;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Discards everything pushed since `mark`, simulating a managed call
    /// returning and its spilled roots going out of scope.
    pub fn truncate(&mut self, mark: usize) {
        self.slots.truncate(mark);
    }

    /// The backing buffer's byte range, used by the collector to filter out
    /// values that merely point back into the root stack itself (e.g. a
    /// saved frame pointer) rather than into the heap.
    pub fn byte_range(&self) -> (usize, usize) {
        let start = self.slots.as_ptr() as usize;
        let end = start + self.slots.len() * std::mem::size_of::<Value>();
        (start, end)
    }
}

impl Default for RootStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_truncate_round_trip() {
        let mut stack = RootStack::new();
        stack.push(Value::from_smi(1));
        let mark = stack.mark();
        stack.push(Value::from_smi(2));
        stack.push(Value::from_smi(3));
        assert_eq!(stack.len(), 3);
        stack.truncate(mark);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.get(0).as_smi(), 1);
    }
}
