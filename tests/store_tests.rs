use cesk::ast::{BinOp, IntType, Type};
use cesk::interpreter::config::{FrameAlloc, HeapAlloc, StoreUpdate};
use cesk::interpreter::continuation::{Continuation, KontAddress, KontKind};
use cesk::interpreter::control::Control;
use cesk::memory::domain::{bound, exact_arith, Concrete};
use cesk::memory::environment::{Environment, FrameId};
use cesk::memory::limits::{Limits, LimitsProfile};
use cesk::memory::store::Store;
use cesk::memory::value::{Address, Base, FrameAddress, HeapId, Scalar, Value, ValueSet};
use cesk::memory::Unit;
use cesk::CeskError;
use proptest::prelude::*;

fn limits() -> Limits {
    Limits::new(LimitsProfile::Cesk)
}

fn store(update: StoreUpdate) -> Store<Concrete> {
    Store::new(limits(), update, HeapAlloc::Concrete)
}

fn int_unit() -> Unit {
    Unit {
        size: 4,
        scalar: Scalar::Int(IntType::INT),
    }
}

fn local(name: &str) -> Base {
    Base::Frame(FrameAddress {
        frame: FrameId(1),
        name: name.to_string(),
    })
}

fn int(value: i128) -> ValueSet<Concrete> {
    ValueSet::singleton(Value::int(value, &limits()))
}

const INT: Scalar = Scalar::Int(IntType::INT);
const CHAR: Scalar = Scalar::Int(IntType::CHAR);

proptest! {
    #[test]
    fn test_int_write_read_roundtrip(v in any::<i32>()) {
        let mut store = store(StoreUpdate::Strong);
        let address = store.allocate(local("x"), &[int_unit()], 1).unwrap();
        store.write(&address, &int(i128::from(v)), INT, false).unwrap();
        prop_assert_eq!(store.read(&address, INT).unwrap(), int(i128::from(v)));
    }

    #[test]
    fn test_addition_wraps_like_i32(a in any::<i32>(), b in any::<i32>()) {
        let sum = exact_arith(BinOp::Add, i128::from(a), i128::from(b), IntType::INT, &limits()).unwrap();
        prop_assert_eq!(sum, i128::from(a.wrapping_add(b)));
    }

    #[test]
    fn test_char_bound_matches_i8_cast(v in any::<i16>()) {
        prop_assert_eq!(bound(i128::from(v), IntType::CHAR, &limits()), i128::from(v as i8));
    }

    #[test]
    fn test_low_byte_of_int(v in any::<i32>()) {
        let mut store = store(StoreUpdate::Strong);
        let address = store.allocate(local("x"), &[int_unit()], 1).unwrap();
        store.write(&address, &int(i128::from(v)), INT, false).unwrap();
        let low = store.read(&address, CHAR).unwrap();
        let expected = Value::integer(i128::from(v as i8), IntType::CHAR, &limits());
        prop_assert_eq!(low, ValueSet::singleton(expected));
    }
}

#[test]
fn test_fresh_cell_is_uninitialized() {
    let mut store = store(StoreUpdate::Strong);
    let address = store.allocate(local("x"), &[int_unit()], 1).unwrap();
    let values = store.read(&address, INT).unwrap();
    assert!(values.all_uninitialized());
}

#[test]
fn test_byte_write_inside_int() {
    let mut store = store(StoreUpdate::Strong);
    let address = store.allocate(local("x"), &[int_unit()], 1).unwrap();
    store.write(&address, &int(0), INT, false).unwrap();

    let one = ValueSet::singleton(Value::integer(1, IntType::CHAR, &limits()));
    store.write(&address.offset_by(1), &one, CHAR, false).unwrap();

    assert_eq!(store.read(&address, INT).unwrap(), int(256));
}

#[test]
fn test_char_reads_of_int_bytes() {
    let mut store = store(StoreUpdate::Strong);
    let address = store.allocate(local("x"), &[int_unit()], 1).unwrap();
    store.write(&address, &int(0x0102_0304), INT, false).unwrap();

    let char_at = |offset| store.read(&address.offset_by(offset), CHAR).unwrap();
    let expect = |v| ValueSet::singleton(Value::integer(v, IntType::CHAR, &limits()));
    assert_eq!(char_at(0), expect(4));
    assert_eq!(char_at(3), expect(1));
}

#[test]
fn test_out_of_bounds_offsets_fault() {
    let mut store = store(StoreUpdate::Strong);
    let address = store.allocate(local("a"), &[int_unit()], 2).unwrap();

    assert!(store.add_offset_to_pointer(&address, 4).is_ok());
    assert!(matches!(
        store.add_offset_to_pointer(&address, 8),
        Err(CeskError::SegFault { .. })
    ));
    assert!(matches!(
        store.add_offset_to_pointer(&address, -1),
        Err(CeskError::SegFault { .. })
    ));
    assert!(matches!(
        store.read(&address.offset_by(8), INT),
        Err(CeskError::SegFault { .. })
    ));
}

#[test]
fn test_null_dereference_faults() {
    let store = store(StoreUpdate::Strong);
    assert!(matches!(
        store.read(&Address::null(), INT),
        Err(CeskError::SegFault { .. })
    ));
}

#[test]
fn test_generation_bumps_only_on_change() {
    let mut store = store(StoreUpdate::Strong);
    let address = store.allocate(local("x"), &[int_unit()], 1).unwrap();
    store.write(&address, &int(7), INT, false).unwrap();
    let after_first = store.generation();

    store.write(&address, &int(7), INT, false).unwrap();
    assert_eq!(store.generation(), after_first);

    store.write(&address, &int(8), INT, false).unwrap();
    assert!(store.generation() > after_first);
}

#[test]
fn test_weak_update_accumulates() {
    let mut store = store(StoreUpdate::Weak);
    let address = store.allocate(local("x"), &[int_unit()], 1).unwrap();
    store.write(&address, &int(1), INT, false).unwrap();
    assert_eq!(store.read(&address, INT).unwrap(), int(1));

    store.write(&address, &int(2), INT, false).unwrap();
    let values = store.read(&address, INT).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values, int(1).union(int(2)));
}

#[test]
fn test_reallocation_makes_summary() {
    let mut store = store(StoreUpdate::Strong);
    let first = store.allocate(local("x"), &[int_unit()], 1).unwrap();
    assert!(!store.is_summary(&first.base));
    let second = store.allocate(local("x"), &[int_unit()], 1).unwrap();
    assert_eq!(first, second);
    assert!(store.is_summary(&first.base));

    store.write(&first, &int(1), INT, false).unwrap();
    store.write(&first, &int(2), INT, false).unwrap();
    assert_eq!(store.read(&first, INT).unwrap().len(), 2);
}

#[test]
fn test_free_then_use_is_segfault() {
    let mut store = store(StoreUpdate::Strong);
    let block = store.malloc(3, &[int_unit()], 2).unwrap();
    store.write(&block, &int(5), INT, false).unwrap();
    store.free(&block).unwrap();

    assert!(matches!(store.read(&block, INT), Err(CeskError::SegFault { .. })));
    assert!(matches!(store.free(&block), Err(CeskError::SegFault { .. })));
}

#[test]
fn test_free_of_interior_or_stack_pointer_faults() {
    let mut store = store(StoreUpdate::Strong);
    let block = store.malloc(3, &[int_unit()], 2).unwrap();
    assert!(matches!(
        store.free(&block.offset_by(4)),
        Err(CeskError::SegFault { .. })
    ));

    let local = store.allocate(local("x"), &[int_unit()], 1).unwrap();
    assert!(matches!(store.free(&local), Err(CeskError::SegFault { .. })));

    assert!(store.free(&Address::null()).is_ok());
}

#[test]
fn test_abstract_heap_reuses_site() {
    let mut store: Store<Concrete> = Store::new(limits(), StoreUpdate::Strong, HeapAlloc::Abstract);
    let first = store.malloc(9, &[int_unit()], 1).unwrap();
    let second = store.malloc(9, &[int_unit()], 1).unwrap();
    assert_eq!(first, second);
    assert!(store.is_summary(&first.base));

    store.free(&first).unwrap();
    assert!(store.read(&second, INT).is_ok());

    let other = store.malloc(10, &[int_unit()], 1).unwrap();
    assert_ne!(other.base, first.base);
}

#[test]
fn test_zero_fill_covers_every_unit() {
    let mut store = store(StoreUpdate::Strong);
    let address = store.allocate(local("a"), &[int_unit()], 3).unwrap();
    store.zero_fill(&address.base).unwrap();
    for i in 0..3 {
        assert_eq!(store.read(&address.offset_by(i * 4), INT).unwrap(), int(0));
    }
}

#[test]
fn test_pointer_numeric_roundtrip() {
    let mut store = store(StoreUpdate::Strong);
    let address = store.allocate(local("a"), &[int_unit()], 2).unwrap();
    let second = address.offset_by(4);
    let numeric = store.pointer_to_numeric(&second).unwrap();
    assert_eq!(store.pointer_from_numeric(numeric, 4), Value::pointer(second, 4));
    assert_eq!(store.pointer_from_numeric(0, 4), Value::null(4));
}

#[test]
fn test_heap_base_for_unknown_block_faults() {
    let store = store(StoreUpdate::Strong);
    let dangling = Address::new(Base::Heap(HeapId(42)), 0);
    assert!(matches!(store.read(&dangling, INT), Err(CeskError::SegFault { .. })));
}

#[test]
fn test_redeclaration_keeps_address() {
    let mut env = Environment::new(FrameAlloc::Concrete);
    let (frame, reused) = env.push_frame(1, None);
    assert!(!reused);

    let first = env.declare(frame, "x", &Type::int()).unwrap();
    assert!(first.fresh);
    let second = env.declare(frame, "x", &Type::int()).unwrap();
    assert!(!second.fresh);
    assert_eq!(first.address, second.address);
}

#[test]
fn test_frame_policies() {
    let mut concrete = Environment::new(FrameAlloc::Concrete);
    let (a, _) = concrete.push_frame(1, None);
    let (b, _) = concrete.push_frame(1, None);
    assert_ne!(a, b);

    let mut zero_cfa = Environment::new(FrameAlloc::ZeroCfa);
    let (a, reused_a) = zero_cfa.push_frame(1, None);
    let (b, reused_b) = zero_cfa.push_frame(1, None);
    assert_eq!(a, b);
    assert!(!reused_a);
    assert!(reused_b);
}

#[test]
fn test_lookup_walks_to_parent() {
    let mut env = Environment::new(FrameAlloc::Concrete);
    let (outer, _) = env.push_frame(1, None);
    let (inner, _) = env.push_frame(2, Some(outer));
    env.declare(outer, "x", &Type::int()).unwrap();

    let binding = env.lookup(inner, "x").expect("visible from inner frame");
    assert_eq!(binding.ty, Type::int());
    assert!(env.lookup(outer, "y").is_none());
}

fn call_kont(parent: KontAddress) -> Continuation {
    Continuation {
        ctrl: Control::Invoke,
        env: FrameId(0),
        parent,
        kind: KontKind::Call,
    }
}

#[test]
fn test_sweep_keeps_reachable_continuations() {
    let mut store = store(StoreUpdate::Strong);
    // 1 <- 2 <- 3 is one chain, 4 hangs off halt on its own
    store.write_kont(KontAddress(1), call_kont(KontAddress::HALT), false);
    store.write_kont(KontAddress(2), call_kont(KontAddress(1)), false);
    store.write_kont(KontAddress(3), call_kont(KontAddress(2)), false);
    store.write_kont(KontAddress(4), call_kont(KontAddress::HALT), false);

    let dropped = store.sweep_konts([KontAddress(3)]);

    assert_eq!(dropped, 1);
    assert_eq!(store.kont_count(), 3);
    assert!(store.read_kont(KontAddress(1)).is_ok());
    assert!(store.read_kont(KontAddress(4)).is_err());
}
