//! The runtime ABI: the fixed set of entry points a code generator would
//! call into from compiled code. Everything here operates on raw cell
//! pointers and `Value`s; there is no expression evaluator or parser in this
//! crate, so tests drive these entry points directly the way compiled code
//! would.

use crate::error::RuntimeErrorCode;
use crate::heap::cell::{self, HeapTag};
use crate::heap::root_stack::RootStack;
use crate::heap::value::Value;
use crate::heap::Heap;

/// Allocates a fresh string cell holding `bytes`.
pub fn new_string(heap: &mut Heap, root: &mut RootStack, stack_top: usize, bytes: &[u8]) -> Value {
    let ptr = heap.allocate(root, HeapTag::String, cell::string::size(bytes.len() as u32), Some(stack_top));
    unsafe { cell::string::init(ptr, bytes) };
    Value::from_ptr(ptr)
}

/// Allocates a fresh boxed number cell.
pub fn new_number(heap: &mut Heap, root: &mut RootStack, stack_top: usize, n: f64) -> Value {
    let ptr = heap.allocate(root, HeapTag::Number, cell::number::SIZE, Some(stack_top));
    unsafe { cell::number::init(ptr, n) };
    Value::from_ptr(ptr)
}

/// Allocates a fresh boolean cell.
pub fn new_boolean(heap: &mut Heap, root: &mut RootStack, stack_top: usize, b: bool) -> Value {
    let ptr = heap.allocate(root, HeapTag::Boolean, cell::boolean::SIZE, Some(stack_top));
    unsafe { cell::boolean::init(ptr, b) };
    Value::from_ptr(ptr)
}

/// Allocates a fresh object, paired atomically with its initial map.
pub fn new_object(heap: &mut Heap, root: &mut RootStack, stack_top: usize) -> Value {
    Value::from_ptr(heap.new_object(root, stack_top))
}

/// Allocates a context with `slots` entries, all initialized to `nil`.
pub fn new_context(heap: &mut Heap, root: &mut RootStack, stack_top: usize, slots: u32) -> Value {
    let ptr = heap.allocate(root, HeapTag::Context, cell::context::size(slots), Some(stack_top));
    unsafe { cell::context::init(ptr, slots) };
    Value::from_ptr(ptr)
}

/// Allocates a function cell. `code` is an opaque handle to a native entry
/// point - there is no code generator here, so callers mint their own.
pub fn new_function(
    heap: &mut Heap,
    root: &mut RootStack,
    stack_top: usize,
    code: u64,
    parent_context: Value,
) -> Value {
    let ptr = heap.allocate(root, HeapTag::Function, cell::function::SIZE, Some(stack_top));
    unsafe { cell::function::init(ptr, code, parent_context) };
    Value::from_ptr(ptr)
}

/// Coerces a key to a string it can hash and compare: numbers and booleans
/// get their canonical string form allocated; an already-String value is
/// returned as-is; other tags are out of scope for property keys.
unsafe fn coerce_key_to_string(heap: &mut Heap, root: &mut RootStack, stack_top: usize, key: Value) -> *mut u8 {
    if key.is_heap_ptr() && cell::tag_of(key.as_ptr()) == HeapTag::String {
        return key.as_ptr();
    }
    to_string(heap, root, stack_top, key).as_ptr()
}

/// Looks up `key` in `obj`'s property map, returning the address of the
/// value slot.
///
/// `insert == true`: an absent key claims the first empty slot found while
/// probing (growing the map first if the probe wraps all the way around).
/// `insert == false`: an absent key returns `None` instead of claiming a
/// slot; if the table is completely full, this is also `None` - insert mode
/// grows the table instead of ever hitting that case, since a failed read
/// isn't itself exceptional.
pub fn lookup_property(
    heap: &mut Heap,
    root: &mut RootStack,
    stack_top: usize,
    obj: Value,
    key: Value,
    insert: bool,
) -> Option<*mut u8> {
    assert!(obj.is_heap_ptr() && unsafe { cell::tag_of(obj.as_ptr()) } == HeapTag::Object);
    let obj_ptr = obj.as_ptr();

    unsafe {
        let key_str = coerce_key_to_string(heap, root, stack_top, key);
        let map = cell::object::map(obj_ptr);
        // `mask` is stored the way the object protocol's byte-offset
        // arithmetic defines it, `capacity*8 - 8`; slot indices are
        // `mask >> 3` (capacity - 1), since capacity is always a power of
        // two and `mask`'s low three bits are therefore always clear.
        let mask = cell::object::mask(obj_ptr);
        let index_mask = mask >> 3;
        let slots = cell::map::slot_count(map);

        let hash = cell::string::hash(key_str);
        let start = (hash & mask) >> 3;

        let mut probed = 0u32;
        let mut i = start;
        loop {
            let existing_key = cell::map::key(map, i);
            if existing_key.is_nil() {
                if !insert {
                    return None;
                }
                cell::map::set_key(map, i, Value::from_ptr(key_str));
                return Some(cell::map::value_slot_address(map, i));
            }
            if existing_key.is_heap_ptr() && cell::string::equal(existing_key.as_ptr(), key_str) {
                return Some(cell::map::value_slot_address(map, i));
            }
            probed += 1;
            if probed >= slots {
                // Table is full of non-matching entries.
                if !insert {
                    return None;
                }
                grow_object(heap, root, stack_top, obj);
                return lookup_property(heap, root, stack_top, obj, Value::from_ptr(key_str), insert);
            }
            i = (i + 1) & index_mask;
        }
    }
}

/// Doubles an object's map capacity in place, rehashing every existing
/// entry into the new table. The new map is allocated with collection
/// disabled so the growing map is never observed half-migrated by a
/// concurrent collection (there's only ever one thread here, but the old
/// map is also unrooted for the duration of the copy).
pub fn grow_object(heap: &mut Heap, root: &mut RootStack, stack_top: usize, obj: Value) {
    unsafe {
        let obj_ptr = obj.as_ptr();
        let old_map = cell::object::map(obj_ptr);
        let old_slots = cell::map::slot_count(old_map);
        let new_slots = old_slots << 1;

        let new_map_bytes = cell::map::size(new_slots);
        let new_map = heap.allocate(root, HeapTag::Map, new_map_bytes, None);
        cell::map::init(new_map, new_slots);
        let new_mask = (new_slots << 3) - 8;
        let new_index_mask = new_slots - 1;

        cell::object::set_map(obj_ptr, new_map);
        cell::object::set_mask(obj_ptr, new_mask);

        for i in 0..old_slots {
            let k = cell::map::key(old_map, i);
            if k.is_nil() {
                continue;
            }
            let v = cell::map::value(old_map, i);
            let hash = cell::string::hash(k.as_ptr());
            let mut j = (hash & new_mask) >> 3;
            loop {
                if cell::map::key(new_map, j).is_nil() {
                    cell::map::set_key(new_map, j, k);
                    cell::map::set_value(new_map, j, v);
                    break;
                }
                j = (j + 1) & new_index_mask;
            }
        }
    }
}

pub fn to_string(heap: &mut Heap, root: &mut RootStack, stack_top: usize, v: Value) -> Value {
    if v.is_nil() {
        return new_string(heap, root, stack_top, b"");
    }
    if v.is_smi() {
        return new_string(heap, root, stack_top, v.as_smi().to_string().as_bytes());
    }
    unsafe {
        match cell::tag_of(v.as_ptr()) {
            HeapTag::String => v,
            HeapTag::Number => {
                let n = cell::number::value(v.as_ptr());
                new_string(heap, root, stack_top, format_number(n).as_bytes())
            }
            HeapTag::Boolean => {
                let b = cell::boolean::value(v.as_ptr());
                new_string(heap, root, stack_top, if b { b"true" } else { b"false" })
            }
            HeapTag::Object | HeapTag::Map | HeapTag::Function | HeapTag::Context => {
                new_string(heap, root, stack_top, b"")
            }
        }
    }
}

pub fn to_number(v: Value) -> f64 {
    if v.is_nil() {
        return 0.0;
    }
    if v.is_smi() {
        return v.as_smi() as f64;
    }
    unsafe {
        match cell::tag_of(v.as_ptr()) {
            HeapTag::Number => cell::number::value(v.as_ptr()),
            HeapTag::Boolean => {
                if cell::boolean::value(v.as_ptr()) {
                    1.0
                } else {
                    0.0
                }
            }
            HeapTag::String => {
                let bytes = cell::string::bytes(v.as_ptr());
                // spec's coercion table: "integer parse of bytes; on
                // non-numeric -> 0", not NaN - an object/function/map/context
                // operand likewise coerces to 0, never NaN, so BinOp*'s
                // numeric path stays total over every tag.
                std::str::from_utf8(bytes).ok().and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0) as f64
            }
            HeapTag::Object | HeapTag::Map | HeapTag::Function | HeapTag::Context => 0.0,
        }
    }
}

pub fn to_boolean(v: Value) -> bool {
    if v.is_nil() {
        return false;
    }
    if v.is_smi() {
        return v.as_smi() != 0;
    }
    unsafe {
        match cell::tag_of(v.as_ptr()) {
            HeapTag::Number => cell::number::value(v.as_ptr()) != 0.0,
            HeapTag::Boolean => cell::boolean::value(v.as_ptr()),
            HeapTag::String => !cell::string::bytes(v.as_ptr()).is_empty(),
            HeapTag::Object | HeapTag::Map | HeapTag::Function | HeapTag::Context => true,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn is_reference_tag(v: Value) -> bool {
    v.is_heap_ptr()
        && matches!(unsafe { cell::tag_of(v.as_ptr()) }, HeapTag::Object | HeapTag::Function | HeapTag::Map | HeapTag::Context)
}

fn is_string_tag(v: Value) -> bool {
    v.is_heap_ptr() && unsafe { cell::tag_of(v.as_ptr()) } == HeapTag::String
}

/// `+`: nil is additive identity, strings concatenate, everything else
/// coerces to a number. Either operand being an Object/Function/Map/Context
/// short-circuits to `nil` - there is no sensible arithmetic or
/// concatenation meaning for a reference type here.
pub fn bin_op_add(heap: &mut Heap, root: &mut RootStack, stack_top: usize, lhs: Value, rhs: Value) -> Value {
    if lhs.is_nil() && rhs.is_nil() {
        return Value::from_smi(0);
    }
    if lhs.is_nil() {
        return rhs;
    }
    if rhs.is_nil() {
        return lhs;
    }
    if is_reference_tag(lhs) || is_reference_tag(rhs) {
        return Value::NIL;
    }

    let lhs_is_string = lhs.is_heap_ptr() && unsafe { cell::tag_of(lhs.as_ptr()) } == HeapTag::String;
    let rhs_is_string = rhs.is_heap_ptr() && unsafe { cell::tag_of(rhs.as_ptr()) } == HeapTag::String;

    if lhs_is_string || rhs_is_string {
        let ls = to_string(heap, root, stack_top, lhs);
        root.push(ls);
        let rs = to_string(heap, root, stack_top, rhs);
        let mark = root.mark();
        unsafe {
            let mut bytes = cell::string::bytes(ls.as_ptr()).to_vec();
            bytes.extend_from_slice(cell::string::bytes(rs.as_ptr()));
            new_string(heap, root, mark, &bytes)
        }
    } else {
        new_number(heap, root, stack_top, to_number(lhs) + to_number(rhs))
    }
}

/// `-`/`*`/`/` only have numeric meaning: a reference-typed operand
/// (Object/Function/Map/Context) or a string operand - neither of which has
/// a subtraction/multiplication/division semantics anywhere in this design -
/// raises `NotANumber` rather than silently coercing through `to_number`,
/// unlike `+`'s nil-identity/string-concat/numeric three-way split.
fn numeric_bin_op(
    heap: &mut Heap,
    root: &mut RootStack,
    stack_top: usize,
    lhs: Value,
    rhs: Value,
    op: impl FnOnce(f64, f64) -> f64,
) -> Value {
    if is_reference_tag(lhs) || is_reference_tag(rhs) || is_string_tag(lhs) || is_string_tag(rhs) {
        heap.pending_exception = Some(RuntimeErrorCode::NotANumber);
        return Value::NIL;
    }
    new_number(heap, root, stack_top, op(to_number(lhs), to_number(rhs)))
}

pub fn bin_op_sub(heap: &mut Heap, root: &mut RootStack, stack_top: usize, lhs: Value, rhs: Value) -> Value {
    numeric_bin_op(heap, root, stack_top, lhs, rhs, |a, b| a - b)
}

pub fn bin_op_mul(heap: &mut Heap, root: &mut RootStack, stack_top: usize, lhs: Value, rhs: Value) -> Value {
    numeric_bin_op(heap, root, stack_top, lhs, rhs, |a, b| a * b)
}

pub fn bin_op_div(heap: &mut Heap, root: &mut RootStack, stack_top: usize, lhs: Value, rhs: Value) -> Value {
    numeric_bin_op(heap, root, stack_top, lhs, rhs, |a, b| a / b)
}

/// Records a pending exception and returns `nil`. There is no native stack
/// to unwind here; callers observe `heap.pending_exception` the way host
/// code observes a managed call having returned null.
pub fn throw(heap: &mut Heap, code: RuntimeErrorCode) -> Value {
    heap.pending_exception = Some(code);
    Value::NIL
}
