use cesk::ast::{BinOp, NodeId, OmpClause, Program, ProgramBuilder, Type};
use cesk::interpreter::config::{Config, KontAlloc, OmpSettings};
use cesk::interpreter::continuation::KontAddress;
use cesk::interpreter::control::Control;
use cesk::interpreter::omp::{BarrierId, OmpRuntime};
use cesk::interpreter::scheduler::Scheduler;
use cesk::interpreter::state::{State, ThreadId};
use cesk::memory::environment::FrameId;
use cesk::{CeskError, RunReport};

fn with_threads(thread_limit: usize) -> Config {
    Config {
        omp: OmpSettings {
            thread_limit,
            ..OmpSettings::default()
        },
        ..Config::default()
    }
}

fn main_program(b: &mut ProgramBuilder, mut items: Vec<NodeId>) -> NodeId {
    let zero = b.int(0);
    items.push(b.ret(Some(zero)));
    b.function("main", Type::int(), vec![], items)
}

fn run(program: Program, config: Config) -> RunReport {
    cesk::run(program, config)
}

/// `#pragma omp parallel num_threads(n) { <items> } printf("after");`
fn parallel_region(n: i64, make_items: impl FnOnce(&mut ProgramBuilder) -> Vec<NodeId>) -> Program {
    let mut b = ProgramBuilder::new();
    let requested = b.int(n);
    let items = make_items(&mut b);
    let region = b.omp_parallel(vec![OmpClause::NumThreads(requested)], items);
    let after = b.printf("after", vec![]);
    let main = main_program(&mut b, vec![region, after]);
    b.finish(vec![main])
}

#[test]
fn test_parallel_region_joins_before_continuing() {
    let program = parallel_region(4, |b| vec![b.printf("x", vec![])]);

    let report = run(program, with_threads(4));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "xxxxafter");
}

#[test]
fn test_join_survivor_under_every_kont_policy() {
    for policy in [KontAlloc::Concrete, KontAlloc::ZeroCfa, KontAlloc::P4f] {
        let program = parallel_region(4, |b| vec![b.printf("x", vec![])]);
        let config = Config {
            kont_alloc: policy,
            ..with_threads(4)
        };

        let report = run(program, config);

        assert!(report.fault.is_none(), "{}: {:?}", policy, report.fault);
        assert_eq!(report.output, "xxxxafter", "kont policy {}", policy);
        assert_eq!(report.return_value.as_deref(), Some("0"));
    }
}

#[test]
fn test_thread_numbers_in_team() {
    let program = parallel_region(4, |b| {
        let tid = b.call("omp_get_thread_num", vec![]);
        vec![b.printf("%d", vec![tid])]
    });

    let report = run(program, with_threads(4));

    assert_eq!(report.output, "0123after");
}

#[test]
fn test_team_size_reported_inside_region() {
    let program = parallel_region(3, |b| {
        let size = b.call("omp_get_num_threads", vec![]);
        vec![b.printf("%d", vec![size])]
    });

    let report = run(program, with_threads(4));

    assert_eq!(report.output, "333after");
}

#[test]
fn test_thread_limit_caps_team() {
    // default limit of 2 threads; dynamic adjustment shrinks the team
    let program = parallel_region(8, |b| vec![b.printf("x", vec![])]);

    let report = run(program, Config::default());

    assert_eq!(report.output, "xxafter");
}

#[test]
fn test_static_team_size_without_dynamic_adjustment() {
    let program = parallel_region(8, |b| vec![b.printf("x", vec![])]);
    let config = Config {
        omp: OmpSettings {
            dynamic: false,
            ..OmpSettings::default()
        },
        ..Config::default()
    };

    let report = run(program, config);

    assert_eq!(report.output, "xafter");
}

#[test]
fn test_firstprivate_copies_in() {
    // int x = 10; parallel firstprivate(x) { x = x + omp_get_thread_num(); printf("%d ", x); } printf("%d", x);
    let mut b = ProgramBuilder::new();
    let ten = b.int(10);
    let decl = b.decl("x", Type::int(), Some(ten));
    let x = b.id("x");
    let tid = b.call("omp_get_thread_num", vec![]);
    let sum = b.binary(BinOp::Add, x, tid);
    let assign = b.assign_to("x", sum);
    let x = b.id("x");
    let inner = b.printf("%d ", vec![x]);
    let region = b.omp_parallel(vec![OmpClause::FirstPrivate(vec!["x".to_string()])], vec![assign, inner]);
    let x = b.id("x");
    let outer = b.printf("%d", vec![x]);
    let main = main_program(&mut b, vec![decl, region, outer]);

    let report = run(b.finish(vec![main]), Config::default());

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "10 11 10");
}

#[test]
fn test_shared_variable_sees_team_writes() {
    // int hits = 0; parallel { critical { hits = hits + 1; } } printf("%d", hits);
    let mut b = ProgramBuilder::new();
    let zero = b.int(0);
    let decl = b.decl("hits", Type::int(), Some(zero));
    let hits = b.id("hits");
    let one = b.int(1);
    let bump = b.binary(BinOp::Add, hits, one);
    let assign = b.assign_to("hits", bump);
    let critical = b.omp_critical(vec![assign]);
    let region = b.omp_parallel(vec![OmpClause::Shared(vec!["hits".to_string()])], vec![critical]);
    let hits = b.id("hits");
    let print = b.printf("%d", vec![hits]);
    let main = main_program(&mut b, vec![decl, region, print]);

    let report = run(b.finish(vec![main]), with_threads(4));

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "2");
}

#[test]
fn test_omp_for_sums_iterations() {
    // int i; int sum = 0; omp for (i = 0; i < 4; i++) { critical { sum = sum + i; } } printf("%d", sum);
    let mut b = ProgramBuilder::new();
    let decl_i = b.decl("i", Type::int(), None);
    let zero = b.int(0);
    let decl_sum = b.decl("sum", Type::int(), Some(zero));
    let sum = b.id("sum");
    let i = b.id("i");
    let next = b.binary(BinOp::Add, sum, i);
    let assign = b.assign_to("sum", next);
    let critical = b.omp_critical(vec![assign]);
    let start = b.int(0);
    let end = b.int(4);
    let lp = b.omp_for(vec![], "i", start, end, vec![critical]);
    let sum = b.id("sum");
    let print = b.printf("%d", vec![sum]);
    let main = main_program(&mut b, vec![decl_i, decl_sum, lp, print]);

    let report = run(b.finish(vec![main]), Config::default());

    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "6");
}

#[test]
fn test_nested_critical_deadlocks() {
    let mut b = ProgramBuilder::new();
    let hello = b.printf("in", vec![]);
    let inner = b.omp_critical(vec![hello]);
    let outer = b.omp_critical(vec![inner]);
    let main = main_program(&mut b, vec![outer]);

    let report = run(b.finish(vec![main]), Config::default());

    assert!(matches!(report.fault, Some(CeskError::Deadlock { blocked: 1 })));
    assert!(report.memory_safe);
    assert_eq!(report.exit_code(), 5);
    assert_eq!(report.output, "");
}

fn waiting(tid: u32, barrier: BarrierId) -> State {
    State::new(Control::Invoke, FrameId(0), KontAddress::HALT, ThreadId(tid)).waiting_on(barrier)
}

#[test]
fn test_scheduler_reports_deadlock() {
    let mut runtime = OmpRuntime::new(OmpSettings::default());
    runtime.add_to_barrier(BarrierId::Construct(1));
    runtime.add_to_barrier(BarrierId::Construct(2));

    let mut scheduler = Scheduler::new(false);
    scheduler.add_states(
        vec![waiting(1, BarrierId::Construct(1)), waiting(2, BarrierId::Construct(2))],
        &runtime,
        0,
    );

    assert_eq!(scheduler.blocked(), 2);
    assert!(matches!(
        scheduler.next(&runtime),
        Err(CeskError::Deadlock { blocked: 2 })
    ));
}

#[test]
fn test_scheduler_wakes_cleared_barrier() {
    let mut runtime = OmpRuntime::new(OmpSettings::default());
    runtime.add_to_barrier(BarrierId::Construct(1));

    let mut scheduler = Scheduler::new(false);
    scheduler.add_states(vec![waiting(1, BarrierId::Construct(1))], &runtime, 0);
    runtime.remove_from_barrier(BarrierId::Construct(1));

    let woken = scheduler.next(&runtime).unwrap().expect("state is released");
    assert_eq!(woken.tid, ThreadId(1));
    assert_eq!(woken.barrier, None);
    assert!(scheduler.next(&runtime).unwrap().is_none());
}

#[test]
fn test_scheduler_is_fifo() {
    let runtime = OmpRuntime::new(OmpSettings::default());
    let mut scheduler = Scheduler::new(false);
    let states: Vec<State> = (1..=3)
        .map(|tid| State::new(Control::Invoke, FrameId(0), KontAddress::HALT, ThreadId(tid)))
        .collect();
    scheduler.add_states(states, &runtime, 0);

    let order: Vec<u32> = std::iter::from_fn(|| scheduler.next(&runtime).unwrap())
        .map(|state| state.tid.0)
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(scheduler.stats().evaluated, 3);
}

#[test]
fn test_child_thread_budget() {
    let mut runtime = OmpRuntime::new(OmpSettings {
        thread_limit: 4,
        ..OmpSettings::default()
    });
    assert_eq!(runtime.num_child_threads(Some(3)), 2);
    // the contention group shrinks what later regions may claim
    assert_eq!(runtime.num_child_threads(Some(3)), 1);
    assert_eq!(runtime.num_child_threads(Some(3)), 0);
}
