//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Ownership guard that unloads the engine exactly once."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use cosim_engine::{EngineError, SimulationEngine};
use tracing::{debug, warn};

/// Exclusive owner of an engine whose instance has been created.
///
/// [`release`](Self::release) consumes the guard and unloads the engine. A
/// guard dropped without being released (early return, panic) unloads in
/// `Drop`, so the instance is torn down exactly once on every path.
#[derive(Debug)]
pub struct EngineSession<E: SimulationEngine> {
    engine: E,
    released: bool,
}

impl<E: SimulationEngine> EngineSession<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            released: false,
        }
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn release(mut self) -> Result<(), EngineError> {
        self.released = true;
        debug!("releasing engine instance");
        self.engine.unload()
    }
}

impl<E: SimulationEngine> Drop for EngineSession<E> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        warn!("engine session dropped without explicit release; unloading");
        if let Err(err) = self.engine.unload() {
            warn!(error = %err, "engine unload during drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_engine::InstanceOptions;
    use cosim_testharness::ScriptedEngine;

    fn instantiated() -> ScriptedEngine {
        let mut engine = ScriptedEngine::default();
        engine.create_instance(InstanceOptions::default()).unwrap();
        engine
    }

    #[test]
    fn release_unloads_once() {
        let engine = instantiated();
        let journal = engine.journal();
        let session = EngineSession::new(engine);
        session.release().unwrap();
        assert_eq!(journal.unload_count(), 1);
    }

    #[test]
    fn drop_without_release_unloads() {
        let engine = instantiated();
        let journal = engine.journal();
        {
            let _session = EngineSession::new(engine);
        }
        assert_eq!(journal.unload_count(), 1);
    }

    #[test]
    fn panic_while_holding_session_still_unloads() {
        let engine = instantiated();
        let journal = engine.journal();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut session = EngineSession::new(engine);
            session.engine_mut().advance_turbine_simulation();
            panic!("controller blew up");
        }));
        assert!(outcome.is_err());
        assert_eq!(journal.unload_count(), 1);
    }
}
