use cesk::ast::{param, BaseType, BinOp, IntType, NodeId, Program, ProgramBuilder, Type, UnOp};
use cesk::interpreter::config::Config;
use cesk::interpreter::control::Control;
use cesk::memory::domain::Concrete;
use cesk::{CeskError, Machine, RunReport};

/// `int main() { <items> return 0; }`
fn main_program(b: &mut ProgramBuilder, mut items: Vec<NodeId>) -> NodeId {
    let zero = b.int(0);
    items.push(b.ret(Some(zero)));
    b.function("main", Type::int(), vec![], items)
}

fn run(program: Program) -> RunReport {
    cesk::run(program, Config::default())
}

#[test]
fn test_simple_arithmetic() {
    let mut b = ProgramBuilder::new();
    let two = b.int(2);
    let three = b.int(3);
    let sum = b.binary(BinOp::Add, two, three);
    let decl = b.decl("x", Type::int(), Some(sum));
    let x = b.id("x");
    let print = b.printf("%d", vec![x]);
    let main = main_program(&mut b, vec![decl, print]);

    let report = run(b.finish(vec![main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "5");
    assert!(report.memory_safe);
    assert_eq!(report.return_value.as_deref(), Some("0"));
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.states_matched, 0);
}

#[test]
fn test_char_wraps_to_minimum() {
    let mut b = ProgramBuilder::new();
    let max = b.int(127);
    let decl = b.decl("c", Type::char(), Some(max));
    let c = b.id("c");
    let one = b.int(1);
    let next = b.binary(BinOp::Add, c, one);
    let assign = b.assign_to("c", next);
    let c = b.id("c");
    let print = b.printf("%d", vec![c]);
    let main = main_program(&mut b, vec![decl, assign, print]);

    let report = run(b.finish(vec![main]));

    assert_eq!(report.output, "-128");
}

#[test]
fn test_int_overflow_wraps() {
    let mut b = ProgramBuilder::new();
    let max = b.int(i64::from(i32::MAX));
    let decl = b.decl("n", Type::int(), Some(max));
    let n = b.id("n");
    let one = b.int(1);
    let next = b.binary(BinOp::Add, n, one);
    let print = b.printf("%d", vec![next]);
    let main = main_program(&mut b, vec![decl, print]);

    let report = run(b.finish(vec![main]));

    assert_eq!(report.output, i32::MIN.to_string());
}

#[test]
fn test_division_by_zero_is_reported() {
    let mut b = ProgramBuilder::new();
    let one = b.int(1);
    let zero = b.int(0);
    let quotient = b.binary(BinOp::Div, one, zero);
    let decl = b.decl("q", Type::int(), Some(quotient));
    let main = main_program(&mut b, vec![decl]);

    let report = run(b.finish(vec![main]));

    assert!(matches!(report.fault, Some(CeskError::DivisionByZero { .. })));
    assert!(report.memory_safe);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_array_out_of_bounds_is_segfault() {
    let mut b = ProgramBuilder::new();
    let decl = b.decl("a", Type::int().with_array(2), None);
    let a = b.id("a");
    let five = b.int(5);
    let element = b.index(a, five);
    let one = b.int(1);
    let assign = b.assign(element, one);
    let main = main_program(&mut b, vec![decl, assign]);

    let report = run(b.finish(vec![main]));

    assert!(matches!(report.fault, Some(CeskError::SegFault { .. })));
    assert!(!report.memory_safe);
    assert_eq!(report.exit_code(), 2);
}

#[test]
fn test_array_read_out_of_bounds_is_segfault() {
    // int a[2]; a[5];
    let mut b = ProgramBuilder::new();
    let decl = b.decl("a", Type::int().with_array(2), None);
    let a = b.id("a");
    let five = b.int(5);
    let element = b.index(a, five);
    let main = main_program(&mut b, vec![decl, element]);

    let report = run(b.finish(vec![main]));

    assert!(matches!(report.fault, Some(CeskError::SegFault { .. })));
    assert!(!report.memory_safe);
}

#[test]
fn test_index_back_from_one_past_end() {
    // int a[3]; a[2] = 7; int *p = a + 3; printf("%d", p[-1]);
    let mut b = ProgramBuilder::new();
    let decl = b.decl("a", Type::int().with_array(3), None);
    let a = b.id("a");
    let two = b.int(2);
    let last = b.index(a, two);
    let seven = b.int(7);
    let store = b.assign(last, seven);
    let a = b.id("a");
    let three = b.int(3);
    let end = b.binary(BinOp::Add, a, three);
    let decl_p = b.decl("p", Type::int().with_pointer(), Some(end));
    let p = b.id("p");
    let back = b.int(-1);
    let element = b.index(p, back);
    let print = b.printf("%d", vec![element]);
    let main = main_program(&mut b, vec![decl, store, decl_p, print]);

    let report = run(b.finish(vec![main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "7");
}

/// `int a[3] = {10, 20, 30}; int *p = a; p = p + <steps>; printf("%d", *p);`
fn pointer_walk(steps: i64) -> RunReport {
    let mut b = ProgramBuilder::new();
    let mut items = vec![b.decl("a", Type::int().with_array(3), None)];
    for (i, value) in [10, 20, 30].into_iter().enumerate() {
        let a = b.id("a");
        let index = b.int(i as i64);
        let element = b.index(a, index);
        let value = b.int(value);
        items.push(b.assign(element, value));
    }
    let a = b.id("a");
    items.push(b.decl("p", Type::int().with_pointer(), Some(a)));
    let p = b.id("p");
    let steps = b.int(steps);
    let moved = b.binary(BinOp::Add, p, steps);
    items.push(b.assign_to("p", moved));
    let p = b.id("p");
    let target = b.unary(UnOp::Deref, p);
    items.push(b.printf("%d", vec![target]));
    let main = main_program(&mut b, items);
    run(b.finish(vec![main]))
}

#[test]
fn test_pointer_walks_array() {
    let report = pointer_walk(2);
    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "30");
}

#[test]
fn test_pointer_past_end_is_segfault() {
    let report = pointer_walk(3);
    assert!(matches!(report.fault, Some(CeskError::SegFault { .. })));
    assert!(!report.memory_safe);
}

#[test]
fn test_address_of_and_write_through_pointer() {
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let decl_x = b.decl("x", Type::int(), Some(zero));
    let x = b.id("x");
    let address = b.unary(UnOp::AddrOf, x);
    let decl_p = b.decl("p", Type::int().with_pointer(), Some(address));
    let p = b.id("p");
    let target = b.unary(UnOp::Deref, p);
    let value = b.int(42);
    let write = b.assign(target, value);
    let x = b.id("x");
    let print = b.printf("%d", vec![x]);
    let main = main_program(&mut b, vec![decl_x, decl_p, write, print]);

    let report = run(b.finish(vec![main]));

    assert_eq!(report.output, "42");
}

#[test]
fn test_function_call_returns_value() {
    let mut b = ProgramBuilder::new();
    let a = b.id("a");
    let bb = b.id("b");
    let sum = b.binary(BinOp::Add, a, bb);
    let ret = b.ret(Some(sum));
    let add = b.function(
        "add",
        Type::int(),
        vec![param("a", Type::int()), param("b", Type::int())],
        vec![ret],
    );
    let three = b.int(3);
    let four = b.int(4);
    let call = b.call("add", vec![three, four]);
    let decl = b.decl("r", Type::int(), Some(call));
    let r = b.id("r");
    let print = b.printf("%d", vec![r]);
    let main = main_program(&mut b, vec![decl, print]);

    let report = run(b.finish(vec![add, main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "7");
}

#[test]
fn test_recursive_factorial() {
    let mut b = ProgramBuilder::new();
    // int fact(int n) { int r; if (n <= 1) { r = 1; } else { int t = fact(n - 1); r = n * t; } return r; }
    let decl_r = b.decl("r", Type::int(), None);
    let n = b.id("n");
    let one = b.int(1);
    let cond = b.binary(BinOp::Le, n, one);
    let one = b.int(1);
    let base = b.assign_to("r", one);
    let then_branch = b.block(vec![base]);
    let n = b.id("n");
    let one = b.int(1);
    let smaller = b.binary(BinOp::Sub, n, one);
    let call = b.call("fact", vec![smaller]);
    let decl_t = b.decl("t", Type::int(), Some(call));
    let n = b.id("n");
    let t = b.id("t");
    let product = b.binary(BinOp::Mul, n, t);
    let step = b.assign_to("r", product);
    let else_branch = b.block(vec![decl_t, step]);
    let branch = b.if_else(cond, then_branch, Some(else_branch));
    let r = b.id("r");
    let ret = b.ret(Some(r));
    let fact = b.function(
        "fact",
        Type::int(),
        vec![param("n", Type::int())],
        vec![decl_r, branch, ret],
    );

    let five = b.int(5);
    let call = b.call("fact", vec![five]);
    let decl = b.decl("f", Type::int(), Some(call));
    let f = b.id("f");
    let print = b.printf("%d", vec![f]);
    let main = main_program(&mut b, vec![decl, print]);

    let report = run(b.finish(vec![fact, main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "120");
}

#[test]
fn test_void_function_called_as_statement() {
    let mut b = ProgramBuilder::new();
    let hello = b.printf("hi ", vec![]);
    let greet = b.function("greet", Type::void(), vec![], vec![hello]);
    let first = b.call("greet", vec![]);
    let second = b.call("greet", vec![]);
    let main = main_program(&mut b, vec![first, second]);

    let report = run(b.finish(vec![greet, main]));

    assert_eq!(report.output, "hi hi ");
}

#[test]
fn test_call_through_function_pointer() {
    let mut b = ProgramBuilder::new();
    let n = b.id("n");
    let two = b.int(2);
    let doubled = b.binary(BinOp::Mul, n, two);
    let ret = b.ret(Some(doubled));
    let twice = b.function("twice", Type::int(), vec![param("n", Type::int())], vec![ret]);

    let fn_ptr = Type::new(BaseType::Function).with_pointer();
    let decl_f = b.decl("f", fn_ptr, None);
    let target = b.id("twice");
    let assign = b.assign_to("f", target);
    let four = b.int(4);
    let call = b.call("f", vec![four]);
    let decl_r = b.decl("r", Type::int(), Some(call));
    let r = b.id("r");
    let print = b.printf("%d", vec![r]);
    let main = main_program(&mut b, vec![decl_f, assign, decl_r, print]);

    let report = run(b.finish(vec![twice, main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "8");
}

#[test]
fn test_argument_count_mismatch() {
    let mut b = ProgramBuilder::new();
    let n = b.id("n");
    let ret = b.ret(Some(n));
    let id = b.function("id", Type::int(), vec![param("n", Type::int())], vec![ret]);
    let call = b.call("id", vec![]);
    let main = main_program(&mut b, vec![call]);

    let report = run(b.finish(vec![id, main]));

    assert!(matches!(
        report.fault,
        Some(CeskError::ArgumentCountMismatch { expected: 1, got: 0, .. })
    ));
}

#[test]
fn test_redeclaration_reuses_address() {
    // int n = 0; L: int x = n; printf("%p ", &x); n = n + 1; if (n < 2) { goto L; }
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let decl_n = b.decl("n", Type::int(), Some(zero));
    let n = b.id("n");
    let decl_x = b.decl("x", Type::int(), Some(n));
    let labelled = b.label("L", decl_x);
    let x = b.id("x");
    let address = b.unary(UnOp::AddrOf, x);
    let print = b.printf("%p ", vec![address]);
    let n = b.id("n");
    let one = b.int(1);
    let next = b.binary(BinOp::Add, n, one);
    let bump = b.assign_to("n", next);
    let n = b.id("n");
    let two = b.int(2);
    let cond = b.binary(BinOp::Lt, n, two);
    let jump = b.goto("L");
    let then_branch = b.block(vec![jump]);
    let branch = b.if_else(cond, then_branch, None);
    let main = main_program(&mut b, vec![decl_n, labelled, print, bump, branch]);

    let report = run(b.finish(vec![main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    let printed: Vec<&str> = report.output.split_whitespace().collect();
    assert_eq!(printed.len(), 2);
    assert_eq!(printed[0], printed[1]);
    assert!(printed[0].starts_with("0x"));
}

#[test]
fn test_goto_past_declaration_declares_implicitly() {
    // goto L; int y = 5; L: y = 7; printf("%d", y);
    let mut b = ProgramBuilder::new();
    let jump = b.goto("L");
    let five = b.int(5);
    let decl = b.decl("y", Type::int(), Some(five));
    let seven = b.int(7);
    let assign = b.assign_to("y", seven);
    let labelled = b.label("L", assign);
    let y = b.id("y");
    let print = b.printf("%d", vec![y]);
    let main = main_program(&mut b, vec![jump, decl, labelled, print]);

    let report = run(b.finish(vec![main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "7");
}

#[test]
fn test_while_loop_counts() {
    // int i = 0; while (i < 3) { printf("%d", i); i = i + 1; }
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let decl = b.decl("i", Type::int(), Some(zero));
    let i = b.id("i");
    let three = b.int(3);
    let cond = b.binary(BinOp::Lt, i, three);
    let i = b.id("i");
    let print = b.printf("%d", vec![i]);
    let i = b.id("i");
    let one = b.int(1);
    let next = b.binary(BinOp::Add, i, one);
    let bump = b.assign_to("i", next);
    let body = b.block(vec![print, bump]);
    let lp = b.while_loop(cond, body);
    let main = main_program(&mut b, vec![decl, lp]);

    let report = run(b.finish(vec![main]));

    assert_eq!(report.output, "012");
}

#[test]
fn test_nondeterministic_branch_explores_both_sides() {
    let mut b = ProgramBuilder::new();
    let choice = b.call("__VERIFIER_nondet_int", vec![]);
    let decl = b.decl("n", Type::int(), Some(choice));
    let n = b.id("n");
    let yes = b.printf("a", vec![]);
    let then_branch = b.block(vec![yes]);
    let no = b.printf("b", vec![]);
    let else_branch = b.block(vec![no]);
    let branch = b.if_else(n, then_branch, Some(else_branch));
    let main = main_program(&mut b, vec![decl, branch]);

    let report = run(b.finish(vec![main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output.len(), 2);
    assert!(report.output.contains('a'));
    assert!(report.output.contains('b'));
}

#[test]
fn test_globals_are_zero_initialized() {
    let mut b = ProgramBuilder::new();
    let three = b.int(3);
    let g = b.decl("g", Type::int(), Some(three));
    let h = b.decl("h", Type::int(), None);
    let arr = b.decl("arr", Type::int().with_array(3), None);
    let g_id = b.id("g");
    let h_id = b.id("h");
    let arr_id = b.id("arr");
    let two = b.int(2);
    let last = b.index(arr_id, two);
    let print = b.printf("%d %d %d", vec![g_id, h_id, last]);
    let main = main_program(&mut b, vec![print]);

    let report = run(b.finish(vec![g, h, arr, main]));

    assert_eq!(report.output, "3 0 0");
}

#[test]
fn test_uninitialized_read_is_reported() {
    let mut b = ProgramBuilder::new();
    let decl = b.decl("x", Type::int(), None);
    let x = b.id("x");
    let one = b.int(1);
    let sum = b.binary(BinOp::Add, x, one);
    let print = b.printf("%d", vec![sum]);
    let main = main_program(&mut b, vec![decl, print]);

    let report = run(b.finish(vec![main]));

    assert!(matches!(
        report.fault,
        Some(CeskError::UseOfUninitializedValue { .. })
    ));
}

#[test]
fn test_strings_and_printf_conversions() {
    let mut b = ProgramBuilder::new();
    let text = b.string("hello");
    let buf = b.decl("buf", Type::char().with_array(6), Some(text));
    let literal = b.string("abc");
    let s = b.decl("s", Type::char().with_pointer(), Some(literal));
    let buf_id = b.id("buf");
    let s_id = b.id("s");
    let s_again = b.id("s");
    let one = b.int(1);
    let second = b.index(s_again, one);
    let hex = b.int(255);
    let long = b.typed_int(5_000_000_000, IntType::LONG);
    let seven = b.int(7);
    let print = b.printf(
        "%s %s %c %x %ld %u%%",
        vec![buf_id, s_id, second, hex, long, seven],
    );
    let main = main_program(&mut b, vec![buf, s, print]);

    let report = run(b.finish(vec![main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "hello abc b ff 5000000000 7%");
}

#[test]
fn test_string_initializer_too_long() {
    let mut b = ProgramBuilder::new();
    let text = b.string("abc");
    let buf = b.decl("buf", Type::char().with_array(2), Some(text));
    let main = main_program(&mut b, vec![buf]);

    let report = run(b.finish(vec![main]));

    assert!(matches!(report.fault, Some(CeskError::SegFault { .. })));
}

#[test]
fn test_float_printing() {
    let mut b = ProgramBuilder::new();
    let half = b.float(1.5);
    let decl = b.decl("d", Type::floating(cesk::ast::FloatKind::Double), Some(half));
    let d = b.id("d");
    let two = b.float(2.0);
    let product = b.binary(BinOp::Mul, d, two);
    let print = b.printf("%f", vec![product]);
    let main = main_program(&mut b, vec![decl, print]);

    let report = run(b.finish(vec![main]));

    assert_eq!(report.output, "3.000000");
}

#[test]
fn test_sizeof_follows_packing() {
    let mut b = ProgramBuilder::new();
    let pair = b.struct_decl(
        "pair",
        vec![
            cesk::ast::field("c", Type::char()),
            cesk::ast::field("i", Type::int()),
        ],
        false,
    );
    let size = b.size_of(Type::structure("pair"));
    let print = b.printf("%d", vec![size]);
    let main = main_program(&mut b, vec![print]);
    let program = b.finish(vec![pair, main]);

    let compact = cesk::run(program.clone(), Config::default());
    assert_eq!(compact.output, "5");

    let gcc = Config {
        limits: "gcc".parse().expect("known profile"),
        ..Config::default()
    };
    assert_eq!(cesk::run(program, gcc).output, "8");
}

#[test]
fn test_missing_main_is_undefined_function() {
    let mut b = ProgramBuilder::new();
    let ret = b.ret(None);
    let helper = b.function("helper", Type::void(), vec![], vec![ret]);

    let report = run(b.finish(vec![helper]));

    assert!(matches!(
        report.fault,
        Some(CeskError::UndefinedFunction { ref name }) if name == "main"
    ));
}

#[test]
fn test_two_return_sites_are_rejected() {
    let mut b = ProgramBuilder::new();
    let one = b.int(1);
    let early = b.ret(Some(one));
    let main = main_program(&mut b, vec![early]);

    let report = run(b.finish(vec![main]));

    assert!(matches!(report.fault, Some(CeskError::Unsupported { .. })));
    assert_eq!(report.exit_code(), 4);
}

#[test]
fn test_step_declaration_descends_into_initializer() {
    let mut b = ProgramBuilder::new();
    let one = b.int(1);
    let decl = b.decl("x", Type::int(), Some(one));
    let main = main_program(&mut b, vec![decl]);

    let mut machine = Machine::<Concrete>::new(b.finish(vec![main]), Config::default())
        .expect("machine builds");
    let initial = machine.start().expect("main exists");
    let successors = machine.step(&initial).expect("declaration steps");

    assert_eq!(successors.len(), 1);
    assert_eq!(successors[0].ctrl, Control::Expr(one));
    assert_ne!(successors[0].kont, initial.kont);
    assert_eq!(successors[0].env, initial.env);
}

/// `int *p = (int *)malloc(2 * sizeof(int)); p[1] = 5; printf("%d", p[1]); free(p); <after>`
fn heap_program(after: impl FnOnce(&mut ProgramBuilder) -> Vec<NodeId>) -> Program {
    let mut b = ProgramBuilder::new();
    let two = b.int(2);
    let size = b.size_of(Type::int());
    let bytes = b.binary(BinOp::Mul, two, size);
    let block = b.call("malloc", vec![bytes]);
    let typed = b.cast(Type::int().with_pointer(), block);
    let decl = b.decl("p", Type::int().with_pointer(), Some(typed));
    let p = b.id("p");
    let one = b.int(1);
    let slot = b.index(p, one);
    let five = b.int(5);
    let store = b.assign(slot, five);
    let p = b.id("p");
    let one = b.int(1);
    let slot = b.index(p, one);
    let print = b.printf("%d", vec![slot]);
    let p = b.id("p");
    let release = b.call("free", vec![p]);
    let mut items = vec![decl, store, print, release];
    items.extend(after(&mut b));
    let main = main_program(&mut b, items);
    b.finish(vec![main])
}

#[test]
fn test_malloc_and_free() {
    let report = run(heap_program(|_| vec![]));
    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "5");
    assert!(report.memory_safe);
}

#[test]
fn test_use_after_free() {
    let report = run(heap_program(|b| {
        let p = b.id("p");
        let target = b.unary(UnOp::Deref, p);
        vec![b.printf("%d", vec![target])]
    }));
    assert_eq!(report.output, "5");
    assert!(matches!(report.fault, Some(CeskError::SegFault { .. })));
    assert!(!report.memory_safe);
}

#[test]
fn test_double_free() {
    let report = run(heap_program(|b| {
        let p = b.id("p");
        vec![b.call("free", vec![p])]
    }));
    assert!(matches!(report.fault, Some(CeskError::SegFault { .. })));
}

#[test]
fn test_results_do_not_depend_on_kont_policy() {
    for policy in ["concrete", "0-cfa", "p4f"] {
        let mut b = ProgramBuilder::new();
        let a = b.id("a");
        let bb = b.id("b");
        let sum = b.binary(BinOp::Add, a, bb);
        let ret = b.ret(Some(sum));
        let add = b.function(
            "add",
            Type::int(),
            vec![param("a", Type::int()), param("b", Type::int())],
            vec![ret],
        );
        let three = b.int(3);
        let four = b.int(4);
        let call = b.call("add", vec![three, four]);
        let decl = b.decl("r", Type::int(), Some(call));
        let r = b.id("r");
        let print = b.printf("%d", vec![r]);
        let main = main_program(&mut b, vec![decl, print]);

        let config = Config {
            kont_alloc: policy.parse().expect("known policy"),
            ..Config::default()
        };
        let report = cesk::run(b.finish(vec![add, main]), config);

        assert!(report.fault.is_none(), "{}: {:?}", policy, report.fault);
        assert_eq!(report.output, "7", "kont policy {}", policy);
    }
}

#[test]
fn test_return_value_takes_return_type() {
    // char f() { return 300; } int main() { int x = f(); printf("%d", x); }
    let mut b = ProgramBuilder::new();
    let big = b.int(300);
    let ret = b.ret(Some(big));
    let f = b.function("f", Type::char(), vec![], vec![ret]);
    let call = b.call("f", vec![]);
    let decl = b.decl("x", Type::int(), Some(call));
    let x = b.id("x");
    let print = b.printf("%d", vec![x]);
    let main = main_program(&mut b, vec![decl, print]);

    let report = run(b.finish(vec![f, main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "44");
}

#[test]
fn test_oversized_allocations_return_null() {
    let mut b = ProgramBuilder::new();
    let huge = b.typed_int(1 << 40, IntType::UNSIGNED_LONG);
    let also_huge = b.typed_int(1 << 40, IntType::UNSIGNED_LONG);
    let overflowing = b.call("calloc", vec![huge, also_huge]);
    let first = b.printf("%p ", vec![overflowing]);
    let large = b.typed_int(1 << 40, IntType::UNSIGNED_LONG);
    let refused = b.call("malloc", vec![large]);
    let second = b.printf("%p", vec![refused]);
    let main = main_program(&mut b, vec![first, second]);

    let report = run(b.finish(vec![main]));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "(nil) (nil)");
}

#[test]
fn test_long_loop_keeps_continuations_bounded() {
    // int i = 0; while (i < 2000) { i = i + 1; } printf("%d", i);
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let decl = b.decl("i", Type::int(), Some(zero));
    let i = b.id("i");
    let limit = b.int(2000);
    let cond = b.binary(BinOp::Lt, i, limit);
    let i = b.id("i");
    let one = b.int(1);
    let next = b.binary(BinOp::Add, i, one);
    let bump = b.assign_to("i", next);
    let body = b.block(vec![bump]);
    let lp = b.while_loop(cond, body);
    let i = b.id("i");
    let print = b.printf("%d", vec![i]);
    let main = main_program(&mut b, vec![decl, lp, print]);

    let mut machine = Machine::<Concrete>::new(b.finish(vec![main]), Config::default()).unwrap();
    let report = machine.run();

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "2000");
    assert!(machine.store().kont_count() < 1000);
}
