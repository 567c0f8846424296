//! Identity tracking: resolve a target, check its proofs, and record a
//! signed statement that the tracker did so.

pub mod assertion;
pub mod decision;
pub mod engine;
pub mod outcome;
pub mod proof;
pub mod state;
pub mod statement;

pub use assertion::{SocialAssertion, TargetIdentifier};
pub use decision::{AlwaysProceed, CancelAll, Decision, DecisionMaker, StrictDecider};
pub use engine::{TrackEngine, TrackOptions, TrackRun};
pub use outcome::{IdentityOutcome, OutcomeSummary};
pub use proof::{ProofError, ProofResult, ProofStatus, ProofVerifier, ProofVerifierRegistry};
pub use state::TrackState;
pub use statement::{verify_history, StatementBuilder, TrackingStatement};
