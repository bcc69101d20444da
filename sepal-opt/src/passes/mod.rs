//! Optimization passes over the Sepal IR.

mod dead_state_removal;

pub use dead_state_removal::DeadStateRemoval;

use sepal_ir::Proc;
use sepal_utils::SepalResult;
use std::time::Instant;

/// Trait that describes named things. Every pass implements this so pass
/// runs can be identified in logs.
pub trait Named {
    /// The name of a pass. Is used for identifying passes.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
}

/// A transformation applied to a single proc. Returns whether the proc
/// changed.
pub trait ProcPass: Named {
    fn run(proc_: &mut Proc) -> SepalResult<bool>;

    /// Run the pass with pass-level timing and logging.
    fn do_pass(proc_: &mut Proc) -> SepalResult<bool> {
        let start = Instant::now();
        let changed = Self::run(proc_)?;
        log::info!(
            "{}: {}ms{}",
            Self::name(),
            start.elapsed().as_millis(),
            if changed { "" } else { " (no change)" }
        );
        Ok(changed)
    }
}

/// Remove state elements of `proc_` whose values cannot influence any
/// observable operation, and drop zero-width state entirely. Mutates the
/// proc in place; returns whether anything changed. Idempotent.
pub fn optimize_proc_state(proc_: &mut Proc) -> SepalResult<bool> {
    DeadStateRemoval::do_pass(proc_)
}
