//! Stop-the-world, single-threaded Cheney-style semispace collector.
//!
//! Four phases, run synchronously inside `Heap::allocate`:
//!
//! 1. Root discovery: scan the root stack from `stack_top` to its current
//!    end, filtering out non-pointers and anything that merely points back
//!    into the stack itself (a saved frame pointer, say).
//! 2. Grey processing: copy each reachable cell into to-space, leave a
//!    forwarding mark on the source, and trace its outgoing pointers -
//!    which themselves land in the grey queue, addressed as slots inside
//!    the *new* copy.
//! 3. Mark clearing: drain the black queue (the to-space copies), clearing
//!    any forwarding mark so a later collection starts from a clean state.
//! 4. Swap: the freshly populated to-space becomes the new new-space; the
//!    old one is dropped, taking every unreachable cell with it.

use crate::heap::cell::{self, HeapTag};
use crate::heap::root_stack::RootStack;
use crate::heap::space::Space;
use crate::heap::value::Value;
use crate::heap::Heap;
use std::collections::VecDeque;

/// Where a traced value lives: either a root-stack index or the address of
/// an 8-byte slot inside a to-space cell. Resolving a grey item writes the
/// relocated pointer back through this.
enum Slot {
    Root(usize),
    Heap(*mut u8),
}

impl Slot {
    unsafe fn write(&self, root: &mut RootStack, v: Value) {
        match *self {
            Slot::Root(i) => root.set(i, v),
            Slot::Heap(addr) => addr.cast::<u64>().write(v.0),
        }
    }
}

/// Conservative root filter: a value only counts as a root if it looks like
/// a heap pointer (low bit clear, non-null) and isn't itself an address
/// inside the root stack's own backing storage.
fn is_root_candidate(v: Value, root: &RootStack) -> bool {
    if !v.is_heap_ptr() {
        return false;
    }
    let (start, end) = root.byte_range();
    let addr = v.0 as usize;
    !(addr >= start && addr < end)
}

/// Enqueues every outgoing heap pointer held directly by `ptr` (a freshly
/// copied to-space cell), addressed as slots inside that copy.
///
/// # Safety
/// `ptr` must point to a live, fully-initialized cell of the stated tag.
unsafe fn visit_value(ptr: *mut u8, grey: &mut VecDeque<(Slot, Value)>) {
    match cell::tag_of(ptr) {
        HeapTag::Number | HeapTag::String | HeapTag::Boolean => {
            // leaves: nothing to trace
        }
        HeapTag::Object => {
            let map = cell::object::map(ptr);
            let v = Value::from_ptr(map);
            if is_heap_value(v) {
                grey.push_back((Slot::Heap(cell::object::map_slot_address(ptr)), v));
            }
        }
        HeapTag::Map => {
            let slots = cell::map::slot_count(ptr);
            for i in 0..slots {
                let k = cell::map::key(ptr, i);
                if is_heap_value(k) {
                    grey.push_back((Slot::Heap(cell::map::key_slot_address(ptr, i)), k));
                }
                let v = cell::map::value(ptr, i);
                if is_heap_value(v) {
                    grey.push_back((Slot::Heap(cell::map::value_slot_address(ptr, i)), v));
                }
            }
        }
        HeapTag::Function => {
            let parent = cell::function::parent_context(ptr);
            if is_heap_value(parent) {
                grey.push_back((Slot::Heap(cell::function::parent_context_slot_address(ptr)), parent));
            }
        }
        HeapTag::Context => {
            let slots = cell::context::slot_count(ptr);
            for i in 0..slots {
                let v = cell::context::slot(ptr, i);
                if is_heap_value(v) {
                    grey.push_back((Slot::Heap(cell::context::slot_address(ptr, i)), v));
                }
            }
        }
    }
}

/// Slots inside heap cells (context/object/map/function fields) may
/// legitimately hold `nil` or an unboxed integer alongside heap pointers;
/// only the latter are trace-worthy. Unlike the conservative root-stack
/// scan, every candidate here is a value the object protocol actually put
/// there, so there's no need to filter out stack self-references.
fn is_heap_value(v: Value) -> bool {
    v.is_heap_ptr()
}

pub fn collect_garbage(heap: &mut Heap, root: &mut RootStack, stack_top: usize) {
    log::debug!("gc: collection starting, {} bytes live in new_space", heap.bytes_used());

    let mut grey: VecDeque<(Slot, Value)> = VecDeque::new();
    let mut black: Vec<*mut u8> = Vec::new();
    let mut to_space = Space::new(heap.options().page_size);

    for i in stack_top..root.len() {
        let v = root.get(i);
        if is_root_candidate(v, root) {
            grey.push_back((Slot::Root(i), v));
        }
    }

    while let Some((slot, v)) = grey.pop_front() {
        if !v.is_heap_ptr() {
            continue;
        }
        let ptr = v.as_ptr();
        unsafe {
            if cell::is_gc_marked(ptr) {
                let fwd = cell::forwarding_address(ptr);
                slot.write(root, Value::from_ptr(fwd));
            } else {
                let size = cell::cell_size(ptr);
                let new_ptr = to_space.allocate(size).unwrap_or_else(|| {
                    to_space.add_page(size);
                    to_space.allocate(size).expect("page just grown to fit this object")
                });
                cell::copy_to(ptr, new_ptr);
                cell::set_gc_mark(ptr, new_ptr);
                slot.write(root, Value::from_ptr(new_ptr));
                black.push(new_ptr);
                visit_value(new_ptr, &mut grey);
            }
        }
    }

    for ptr in black.drain(..) {
        unsafe { cell::reset_gc_mark(ptr) };
    }

    log::debug!("gc: collection finished, {} bytes live in to_space", to_space.bytes_used());
    heap.replace_new_space(to_space);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::cell;
    use crate::options::Options;

    #[test]
    fn reachable_values_survive_collection() {
        let mut heap = Heap::new(Options::default());
        let mut root = RootStack::new();
        let mark = root.mark();

        let num = heap.allocate(&mut root, HeapTag::Number, cell::number::SIZE, Some(mark));
        unsafe { cell::number::init(num, 7.0) };
        root.push(Value::from_ptr(num));

        collect_garbage(&mut heap, &mut root, mark);

        let relocated = root.get(mark);
        assert!(relocated.is_heap_ptr());
        unsafe {
            assert_eq!(cell::tag_of(relocated.as_ptr()), HeapTag::Number);
            assert_eq!(cell::number::value(relocated.as_ptr()), 7.0);
        }
    }

    #[test]
    fn unreachable_values_do_not_survive_collection() {
        let mut heap = Heap::new(Options::default());
        let mut root = RootStack::new();
        let mark = root.mark();

        // Allocate but never root it.
        let num = heap.allocate(&mut root, HeapTag::Number, cell::number::SIZE, Some(mark));
        unsafe { cell::number::init(num, 1.0) };
        let before = heap.bytes_used();

        collect_garbage(&mut heap, &mut root, mark);

        assert!(heap.bytes_used() < before);
    }

    #[test]
    fn forwarding_is_applied_at_most_once_per_source_cell() {
        // Two root-stack slots pointing at the same object must both end up
        // pointing at the *same* relocated address, and the object's bytes
        // must not be duplicated.
        let mut heap = Heap::new(Options::default());
        let mut root = RootStack::new();
        let mark = root.mark();

        let num = heap.allocate(&mut root, HeapTag::Number, cell::number::SIZE, Some(mark));
        unsafe { cell::number::init(num, 42.0) };
        root.push(Value::from_ptr(num));
        root.push(Value::from_ptr(num));

        collect_garbage(&mut heap, &mut root, mark);

        let a = root.get(mark);
        let b = root.get(mark + 1);
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn object_traces_through_its_map_to_referenced_values() {
        let mut heap = Heap::new(Options::default());
        let mut root = RootStack::new();
        let mark = root.mark();

        let obj = heap.new_object(&mut root, mark);
        root.push(Value::from_ptr(obj));

        let inner = heap.allocate(&mut root, HeapTag::Number, cell::number::SIZE, Some(root.len()));
        unsafe { cell::number::init(inner, 9.0) };

        unsafe {
            let map = cell::object::map(obj);
            cell::map::set_key(map, 0, Value::from_smi(123));
            cell::map::set_value(map, 0, Value::from_ptr(inner));
        }

        collect_garbage(&mut heap, &mut root, mark);

        let relocated_obj = root.get(mark);
        unsafe {
            let map = cell::object::map(relocated_obj.as_ptr());
            let value = cell::map::value(map, 0);
            assert!(value.is_heap_ptr());
            assert_eq!(cell::tag_of(value.as_ptr()), HeapTag::Number);
            assert_eq!(cell::number::value(value.as_ptr()), 9.0);
        }
    }
}
