use super::support::{build, entries, init_logging, registry, Trace};
use crate::core::error::SimError;
use crate::core::execution::{AbortHandle, CycleEngine, RunStatus, SimulationEngine};

fn scenario(extra_params: &str) -> String {
    format!(
        r#"{{
            "simulation_params": {{"duration": 5.0, "time_step": 1.0}},
            "components": [
                {{"id": "first", "type": "probe"}},
                {{"id": "second", "type": "probe", "params": {{{}}}}},
                {{"id": "third", "type": "probe"}}
            ],
            "logger_config": {{"signals_to_log": ["first.count", "simulation.t"]}}
        }}"#,
        extra_params
    )
}

fn engine(trace: &Trace, extra_params: &str) -> SimulationEngine {
    let registry = registry(trace);
    SimulationEngine::new(CycleEngine::new(build(&registry, &scenario(extra_params))))
}

#[test]
fn test_run_completes_all_ticks() {
    init_logging();
    let trace = Trace::default();
    let mut engine = engine(&trace, "");

    assert_eq!(engine.run().unwrap(), RunStatus::Completed);
    assert_eq!(engine.current_cycle(), 5);
    let rows = engine.cycle_engine().rows();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[4].t, 4.0);
    assert_eq!(rows[4].get_f64("first.count"), Some(5.0));
    assert_eq!(rows[2].get_f64("simulation.t"), Some(2.0));
}

#[test]
fn test_shutdown_runs_exactly_once() {
    init_logging();
    let trace = Trace::default();
    {
        let mut engine = engine(&trace, "");
        engine.run().unwrap();
        engine.shutdown();
        engine.shutdown();
    }
    assert_eq!(
        entries(&trace, "shutdown:"),
        vec!["shutdown:first", "shutdown:second", "shutdown:third"]
    );
}

#[test]
fn test_shutdown_after_component_failure() {
    init_logging();
    let trace = Trace::default();
    let mut engine = engine(&trace, r#""fail_at": 2.0"#);

    let err = engine.run().unwrap_err();
    match &err {
        SimError::ComponentExecution { component_id, t, .. } => {
            assert_eq!(component_id.as_str(), "second");
            assert_eq!(*t, 2.0);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.kind().as_str(), "component_execution_error");
    // Ticks 0 and 1 completed; tick 2 stopped at "second"
    assert_eq!(entries(&trace, "exec:third").len(), 2);
    drop(engine);
    assert_eq!(entries(&trace, "shutdown:").len(), 3);
}

#[test]
fn test_setup_failure_shuts_down_only_initialized() {
    init_logging();
    let trace = Trace::default();
    let mut engine = engine(&trace, r#""fail_setup": true"#);

    let err = engine.run().unwrap_err();
    assert!(matches!(err, SimError::ComponentExecution { t, .. } if t == 0.0));
    assert_eq!(engine.current_cycle(), 0);
    assert_eq!(entries(&trace, "setup:"), vec!["setup:first"]);
    assert_eq!(entries(&trace, "shutdown:"), vec!["shutdown:first"]);
}

#[test]
fn test_abort_stops_between_ticks() {
    init_logging();
    let trace = Trace::default();
    let abort = AbortHandle::new();
    let mut engine = engine(&trace, "").with_abort(abort.clone());

    engine.step().unwrap();
    engine.step().unwrap();
    abort.abort();
    assert_eq!(engine.run().unwrap(), RunStatus::Aborted);
    assert_eq!(engine.current_cycle(), 2);
    assert_eq!(entries(&trace, "shutdown:").len(), 3);
}

#[test]
fn test_dropping_an_unfinished_engine_shuts_down() {
    init_logging();
    let trace = Trace::default();
    {
        let mut engine = engine(&trace, "");
        engine.step().unwrap();
    }
    assert_eq!(entries(&trace, "shutdown:").len(), 3);
}
