//! # Sepal backend passes
//!
//! Analyses and transformations that lower a scheduled dataflow IR toward
//! pipelined hardware. The two entry points the embedding compiler calls:
//!
//! ```rust
//! use sepal_ir::{Function, Op, Type};
//! use sepal_opt::scheduling::{schedule, ScheduleBounds};
//! use sepal_utils::SepalResult;
//!
//! fn main() -> SepalResult<()> {
//!     let mut f = Function::new("double");
//!     let x = f.add_param("x", Type::bits(8));
//!     let doubled = f.add_node(Op::Add, Type::bits(8), &[x, x]);
//!     f.set_return(doubled);
//!
//!     let estimator = |_: &sepal_ir::Node| 200i64;
//!     let delays = sepal_opt::scheduling::compute_node_delays(f.base(), &estimator)?;
//!     let bounds = ScheduleBounds::compute(f.base(), 1, 1000, &delays)?;
//!     let cycles = schedule(f.base(), 1, 1000, &estimator, &bounds, &[])?;
//!     assert_eq!(cycles[&doubled], 0);
//!     Ok(())
//! }
//! ```
//!
//! [crate::passes::optimize_proc_state] is the second entry point: it removes
//! proc state elements whose values cannot influence any observable
//! operation.

pub mod analysis;
pub mod passes;
pub mod scheduling;

pub use passes::optimize_proc_state;
pub use scheduling::schedule;
