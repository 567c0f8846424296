//! Storage for tracking statements and team state.
//!
//! # Directory layout
//!
//! By convention the default root is `~/.keytrack/`:
//!
//! ```text
//! ~/.keytrack/
//! └── statements/
//!     └── {tracker_uid}/
//!         └── {trackee_uid}/
//!             ├── {sequence:010}.json
//!             └── tracked
//! ```
//!
//! # Modules
//!
//! - [`statement_store`]: the `StatementStore` contract and an in-memory backend.
//! - [`file_store`]: JSON-file backend for statements.
//! - [`team_store`]: team rosters and key generations.

pub mod file_store;
pub mod statement_store;
pub mod team_store;

pub use file_store::FileStatementStore;
pub use statement_store::{MemoryStatementStore, StatementStore};
pub use team_store::{MemoryTeamStore, TeamStore};
