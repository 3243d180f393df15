use std::collections::HashMap;

use cesk::ast::{BinOp, Program, ProgramBuilder, Type};
use cesk::interpreter::config::{
    Config, FrameAlloc, HeapAlloc, KontAlloc, OmpSchedule, OmpSettings, StoreUpdate, ValueDomain,
};
use cesk::memory::limits::{Limits, LimitsProfile, Representation};
use cesk::CeskError;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_policy_spellings() {
    assert_eq!("0-cfa".parse::<KontAlloc>().unwrap(), KontAlloc::ZeroCfa);
    assert_eq!("P4F".parse::<KontAlloc>().unwrap(), KontAlloc::P4f);
    assert_eq!("0cfa".parse::<FrameAlloc>().unwrap(), FrameAlloc::ZeroCfa);
    assert_eq!("abstract".parse::<HeapAlloc>().unwrap(), HeapAlloc::Abstract);
    assert_eq!("weak".parse::<StoreUpdate>().unwrap(), StoreUpdate::Weak);
    assert_eq!("k-bounded".parse::<ValueDomain>().unwrap(), ValueDomain::Bounded);
    assert_eq!("gcc".parse::<LimitsProfile>().unwrap(), LimitsProfile::Gcc);
}

#[test]
fn test_policy_display_parses_back() {
    for policy in [KontAlloc::Concrete, KontAlloc::ZeroCfa, KontAlloc::P4f] {
        assert_eq!(policy.to_string().parse::<KontAlloc>().unwrap(), policy);
    }
    assert_eq!(ValueDomain::Bounded.to_string(), "bounded");
    assert_eq!(FrameAlloc::ZeroCfa.to_string(), "0-cfa");
}

#[test]
fn test_unknown_policy_is_rejected() {
    let err = "bogus".parse::<StoreUpdate>().unwrap_err();
    assert_eq!(
        err,
        CeskError::UnknownConfiguration {
            key: "store_update".to_string(),
            value: "bogus".to_string(),
        }
    );
    assert_eq!(err.exit_code(), 3);
    assert!(err.to_string().contains("bogus"));
}

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.domain, ValueDomain::Concrete);
    assert_eq!(config.store_update, StoreUpdate::Strong);
    assert_eq!(config.kont_alloc, KontAlloc::Concrete);
    assert_eq!(config.frame_alloc, FrameAlloc::Concrete);
    assert_eq!(config.heap_alloc, HeapAlloc::Concrete);
    assert_eq!(config.limits, LimitsProfile::Cesk);
    assert_eq!(config.omp, OmpSettings::default());
}

#[test]
fn test_omp_settings_from_lookup() {
    let settings = OmpSettings::from_lookup(lookup(&[
        ("OMP_NUM_THREADS", "4,2"),
        ("OMP_THREAD_LIMIT", "8"),
        ("OMP_DYNAMIC", "false"),
        ("OMP_NESTED", "TRUE"),
        ("OMP_MAX_ACTIVE_LEVELS", "3"),
        ("OMP_SCHEDULE", "static,4"),
    ]))
    .unwrap();

    assert_eq!(
        settings,
        OmpSettings {
            num_threads: 4,
            thread_limit: 8,
            dynamic: false,
            nested: true,
            max_active_levels: 3,
            schedule: OmpSchedule::Static,
        }
    );
}

#[test]
fn test_unset_omp_variables_keep_defaults() {
    let settings = OmpSettings::from_lookup(lookup(&[])).unwrap();
    assert_eq!(settings, OmpSettings::default());
}

#[test]
fn test_invalid_omp_values() {
    for (key, value) in [
        ("OMP_THREAD_LIMIT", "0"),
        ("OMP_NUM_THREADS", "many"),
        ("OMP_DYNAMIC", "maybe"),
        ("OMP_SCHEDULE", "random"),
    ] {
        let err = OmpSettings::from_lookup(lookup(&[(key, value)])).unwrap_err();
        assert!(
            matches!(err, CeskError::UnknownConfiguration { .. }),
            "{}={} gave {:?}",
            key,
            value,
            err
        );
    }
}

#[test]
fn test_limits_profiles() {
    let std = Limits::new(LimitsProfile::Std);
    assert_eq!(std.representation(), Representation::OnesComplement);
    assert_eq!(std.int_width(cesk::ast::IntKind::Int), 2);

    let gcc = Limits::new(LimitsProfile::Gcc);
    assert_eq!(gcc.representation(), Representation::TwosComplement);
    assert_eq!(gcc.int_width(cesk::ast::IntKind::Int), 4);
}

fn sample_program() -> Program {
    let mut b = ProgramBuilder::new();
    let six = b.int(6);
    let seven = b.int(7);
    let product = b.binary(BinOp::Mul, six, seven);
    let print = b.printf("%d", vec![product]);
    let zero = b.int(0);
    let ret = b.ret(Some(zero));
    let main = b.function("main", Type::int(), vec![], vec![print, ret]);
    b.finish(vec![main])
}

#[test]
fn test_program_survives_json() {
    let program = sample_program();
    let json = serde_json::to_string(&program).unwrap();
    let loaded: Program = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded, program);

    let report = cesk::run(loaded, Config::default());
    assert_eq!(report.output, "42");
}

#[test]
fn test_hand_written_json_program() {
    let json = r#"{
        "root": 8,
        "nodes": [
            {"kind": {"Id": {"name": "printf"}}},
            {"kind": {"Constant": {"Str": "%d"}}},
            {"kind": {"Constant": {"Int": {"value": 42, "ty": {"kind": "int", "signed": true}}}}},
            {"kind": {"FuncCall": {"callee": 0, "args": [1, 2]}}},
            {"kind": {"Constant": {"Int": {"value": 0, "ty": {"kind": "int", "signed": true}}}}},
            {"kind": {"Return": {"expr": 4}}, "location": {"line": 3, "column": 5}},
            {"kind": {"Compound": {"items": [3, 5]}}},
            {"kind": {"FuncDef": {
                "name": "main",
                "return_type": {"base": {"Integer": {"kind": "int", "signed": true}}},
                "params": [],
                "body": 6
            }}},
            {"kind": {"FileAst": {"items": [7]}}}
        ]
    }"#;

    let program: Program = serde_json::from_str(json).unwrap();
    assert_eq!(program.location(5).line, 3);

    let report = cesk::run(program, Config::default());
    assert!(report.fault.is_none(), "run failed: {:?}", report.fault);
    assert_eq!(report.output, "42");
    assert_eq!(report.return_value.as_deref(), Some("0"));
}
