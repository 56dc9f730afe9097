//! Reusable scenario blocks.
//!
//! Each block is one step-sized verification composed from the collaborator
//! clients: it performs or observes a single externally visible action and
//! reduces the result to a [`StepOutcome`](crate::scenario::StepOutcome).
//! Suites assemble scenarios out of these blocks so the same checks back
//! every provider and CI combination.

pub mod argo;
pub mod hub;
pub mod scm;
pub mod tekton;
