//! ---
//! cosim_section: "03-logging"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Structured logging context and lifecycle events."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Structured logging helpers shared by the driver crates.

use tracing::Level;

/// Context-enriched logging macros.
pub mod macros;

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Identifier of the co-simulation run.
    pub run: Option<&'a str>,
    /// Turbine index the event refers to.
    pub turbine: Option<i32>,
    /// Loop iteration, when inside the step loop.
    pub iteration: Option<u64>,
    /// Lifecycle phase (load, initialize, running, finalize).
    pub phase: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a run identifier.
    pub fn with_run(mut self, run: &'a str) -> Self {
        self.run = Some(run);
        self
    }

    /// Attach a turbine index.
    pub fn with_turbine(mut self, turbine: i32) -> Self {
        self.turbine = Some(turbine);
        self
    }

    /// Attach a loop iteration.
    pub fn with_iteration(mut self, iteration: u64) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Attach a lifecycle phase.
    pub fn with_phase(mut self, phase: &'a str) -> Self {
        self.phase = Some(phase);
        self
    }
}

/// Outcome attached to lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The transition completed.
    Success,
    /// The transition did not complete but the run continues.
    Degraded,
    /// The transition failed and the run is aborted.
    Fault,
}

impl LifecycleOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LifecycleOutcome::Success => "success",
            LifecycleOutcome::Degraded => "degraded",
            LifecycleOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event.
pub fn log_lifecycle_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: LifecycleOutcome,
) {
    let default_ctx = LogContext::default();
    let ctx = context.unwrap_or(&default_ctx);
    // `tracing::event!` needs a constant level, hence the explicit arms.
    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(
                $level,
                event,
                outcome = outcome.as_str(),
                run = ctx.run.unwrap_or(""),
                turbine = ctx.turbine.unwrap_or_default(),
                iteration = ctx.iteration.unwrap_or_default(),
                phase = ctx.phase.unwrap_or(""),
                message = %message
            )
        };
    }
    match outcome {
        LifecycleOutcome::Success => emit!(Level::INFO),
        LifecycleOutcome::Degraded => emit!(Level::WARN),
        LifecycleOutcome::Fault => emit!(Level::ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        let ctx = LogContext::new().with_run("run-a").with_turbine(0);
        cosim_info!(context = ctx.clone(), "engine instantiated");
        cosim_debug!("debug message");
        cosim_warn!(context = ctx.clone().with_iteration(3), "step skipped");
        cosim_info!(context = ctx, "completed {} iterations", 42);
    }

    #[test]
    fn lifecycle_event_helper_emits() {
        let ctx = LogContext::new().with_phase("load");
        log_lifecycle_event(
            Some(&ctx),
            "driver.load",
            "project loaded",
            LifecycleOutcome::Success,
        );
        log_lifecycle_event(
            None,
            "driver.finalize",
            "export failed",
            LifecycleOutcome::Degraded,
        );
        log_lifecycle_event(
            None,
            "driver.load",
            "missing file",
            LifecycleOutcome::Fault,
        );
    }
}
