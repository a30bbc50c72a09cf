//! adaptest-sim: Simulated test-takers for adaptest.
//!
//! Respondents stand in for the UI layer: they receive the pending item and
//! report an answer and a latency. Batch simulation runs many sessions at
//! known true abilities to measure how well a bank and configuration recover
//! them.

pub mod batch;
pub mod respondent;

pub use batch::{run_session, simulate_batch, simulate_batch_with, SimulationPlan, SimulationReport, ThetaSummary};
pub use respondent::{Respondent, ScriptedRespondent, SimulatedRespondent};
