mod cycle_engine_tests;
mod simulation_engine_tests;
mod support;
