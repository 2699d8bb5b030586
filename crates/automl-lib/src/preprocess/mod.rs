//! Preprocessing plans and their executor
//!
//! A [`PreprocessingPlan`] is fit once per training run on the training
//! split and stored next to the model it was fit for. The
//! [`PreprocessingExecutor`] replays it verbatim at inference so the model
//! always sees the same columns, in the same order, with the same
//! imputation, encoding and scaling.

mod executor;
mod plan;

pub use executor::PreprocessingExecutor;
pub use plan::{DropReason, PlanStep, PreprocessingPlan};
