//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Controller adapter seam between engine queries and control write-back."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use cosim_engine::{ControlVector, SimulationEngine, TurbineIndex};

/// Produces the control vector for one turbine after the step's queries.
///
/// The driver writes the returned vector back to the same turbine within the
/// same iteration. Implementations are infallible because the engine exposes
/// no status for controller evaluation.
pub trait ControllerAdapter<E: SimulationEngine + ?Sized> {
    fn advance(&mut self, engine: &mut E, turbine: TurbineIndex) -> ControlVector;
}

/// Delegates to the controller embedded in the engine project.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineController;

impl<E: SimulationEngine + ?Sized> ControllerAdapter<E> for EngineController {
    fn advance(&mut self, engine: &mut E, turbine: TurbineIndex) -> ControlVector {
        engine.advance_controller(turbine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_engine::InstanceOptions;
    use cosim_testharness::{EngineCall, ScriptedEngine};

    #[test]
    fn engine_controller_queries_the_engine() {
        let mut engine = ScriptedEngine::default();
        engine.create_instance(InstanceOptions::default()).unwrap();
        let journal = engine.journal();
        let output = EngineController.advance(&mut engine, TurbineIndex::PRIMARY);
        let calls = journal.calls();
        assert!(matches!(
            calls.last(),
            Some(EngineCall::AdvanceController { turbine, output: recorded })
                if *turbine == TurbineIndex::PRIMARY && *recorded == output
        ));
    }
}
