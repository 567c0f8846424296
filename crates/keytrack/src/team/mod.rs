//! Teams: rosters, per-generation shared secrets, rotation on
//! membership change, and the client-side wait for a new generation.

pub mod poller;
pub mod rotation;
pub mod service;
pub mod types;

pub use poller::{
    CancellationToken, ClientPoller, PollSchedule, RecordingSleeper, Sleeper, TeamStateSource,
    ThreadSleeper,
};
pub use rotation::TeamKeyRotationCoordinator;
pub use service::TeamService;
pub use types::{
    MembershipChange, TeamId, TeamKeyGeneration, TeamMember, TeamRole, TeamSecret, TeamState,
};
