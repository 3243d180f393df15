use cesk::ast::{BinOp, IntType, NodeId, Program, ProgramBuilder, Type};
use cesk::interpreter::config::{Config, FrameAlloc, StoreUpdate, ValueDomain};
use cesk::memory::domain::{Bounded, BoundedAbstract, Sign, SignAbstract};
use cesk::memory::limits::{Limits, LimitsProfile};
use cesk::memory::value::Value;
use cesk::CeskError;

fn main_program(b: &mut ProgramBuilder, mut items: Vec<NodeId>) -> NodeId {
    let zero = b.int(0);
    items.push(b.ret(Some(zero)));
    b.function("main", Type::int(), vec![], items)
}

fn domain(domain: ValueDomain) -> Config {
    Config {
        domain,
        ..Config::default()
    }
}

/// `int x = <a>; int y = <b>; printf("%d", x <op> y);`
fn binary_program(a: i64, op: BinOp, b_value: i64) -> Program {
    let mut b = ProgramBuilder::new();
    let a = b.int(a);
    let decl_x = b.decl("x", Type::int(), Some(a));
    let bv = b.int(b_value);
    let decl_y = b.decl("y", Type::int(), Some(bv));
    let x = b.id("x");
    let y = b.id("y");
    let result = b.binary(op, x, y);
    let print = b.printf("%d", vec![result]);
    let main = main_program(&mut b, vec![decl_x, decl_y, print]);
    b.finish(vec![main])
}

#[test]
fn test_sign_of_product() {
    let report = cesk::run(binary_program(5, BinOp::Mul, -3), domain(ValueDomain::Sign));
    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "MINUS");
    assert_eq!(report.return_value.as_deref(), Some("ZERO"));
}

#[test]
fn test_sign_of_mixed_sum_is_top() {
    let report = cesk::run(binary_program(5, BinOp::Add, -3), domain(ValueDomain::Sign));
    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "TOP");
}

#[test]
fn test_sign_difference_of_positives() {
    let report = cesk::run(binary_program(5, BinOp::Sub, 3), domain(ValueDomain::Sign));
    assert_eq!(report.output, "TOP");
    let report = cesk::run(binary_program(5, BinOp::Sub, -3), domain(ValueDomain::Sign));
    assert_eq!(report.output, "PLUS");
}

#[test]
fn test_sign_division_by_zero_class() {
    let report = cesk::run(binary_program(5, BinOp::Div, 0), domain(ValueDomain::Sign));
    assert!(matches!(report.fault, Some(CeskError::DivisionByZero { .. })));
}

#[test]
fn test_bounded_stays_exact_in_range() {
    let report = cesk::run(binary_program(3, BinOp::Add, 4), domain(ValueDomain::Bounded));
    assert_eq!(report.output, "7");
}

#[test]
fn test_bounded_overflows_to_top() {
    let report = cesk::run(binary_program(50, BinOp::Add, 60), domain(ValueDomain::Bounded));
    assert_eq!(report.output, "TOP");
}

#[test]
fn test_constructors_abstract_values() {
    let limits = Limits::new(LimitsProfile::Cesk);
    assert_eq!(
        Value::<SignAbstract>::integer(-7, IntType::INT, &limits),
        Value::Integer {
            data: Sign::Minus,
            ty: IntType::INT
        }
    );
    assert_eq!(
        Value::<BoundedAbstract>::integer(100, IntType::INT, &limits),
        Value::Integer {
            data: Bounded::Known(100),
            ty: IntType::INT
        }
    );
    assert_eq!(
        Value::<BoundedAbstract>::integer(101, IntType::INT, &limits),
        Value::Integer {
            data: Bounded::Top,
            ty: IntType::INT
        }
    );
    assert_eq!(Bounded::of(-2), Bounded::Top);
}

#[test]
fn test_abstract_comparison_may_go_both_ways() {
    let limits = Limits::new(LimitsProfile::Cesk);
    let plus = Value::<SignAbstract>::integer(3, IntType::INT, &limits);
    let other = Value::<SignAbstract>::integer(9, IntType::INT, &limits);
    let tests = plus.perform_operation(BinOp::Lt, &other, &limits).unwrap();
    let mut truths: Vec<bool> = tests.iter().flat_map(|v| v.truth().unwrap()).collect();
    truths.sort_unstable();
    truths.dedup();
    assert_eq!(truths, vec![false, true]);
}

/// `int i = 0; while (i < 10) { i = i + 1; } printf("done");`
fn counting_loop() -> Program {
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let decl = b.decl("i", Type::int(), Some(zero));
    let i = b.id("i");
    let ten = b.int(10);
    let cond = b.binary(BinOp::Lt, i, ten);
    let i = b.id("i");
    let one = b.int(1);
    let next = b.binary(BinOp::Add, i, one);
    let bump = b.assign_to("i", next);
    let body = b.block(vec![bump]);
    let lp = b.while_loop(cond, body);
    let done = b.printf("done", vec![]);
    let main = main_program(&mut b, vec![decl, lp, done]);
    b.finish(vec![main])
}

#[test]
fn test_weak_updates_make_abstract_loop_terminate() {
    let config = Config {
        domain: ValueDomain::Sign,
        store_update: StoreUpdate::Weak,
        frame_alloc: FrameAlloc::ZeroCfa,
        ..Config::default()
    };

    let report = cesk::run(counting_loop(), config);

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert!(report.output.contains("done"));
    assert!(report.states_matched > 0);
    assert!(report.states_generated >= report.states_evaluated);
}

#[test]
fn test_strong_updates_never_match_states() {
    let config = Config {
        domain: ValueDomain::Sign,
        max_steps: 500,
        ..Config::default()
    };

    let report = cesk::run(counting_loop(), config);

    assert!(matches!(
        report.fault,
        Some(CeskError::StepLimitExceeded { limit: 500 })
    ));
    assert_eq!(report.states_matched, 0);
}
