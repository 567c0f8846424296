//! Team rosters and the append-only key generation log.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, TrustError};
use crate::team::{TeamId, TeamKeyGeneration, TeamState};

/// Shared team state.
pub trait TeamStore: Send + Sync {
    fn load(&self, id: &TeamId) -> Result<Option<TeamState>>;

    /// Case-insensitive lookup by team name.
    fn find_by_name(&self, name: &str) -> Result<Option<TeamState>> {
        self.load(&TeamId::from_name(name))
    }

    /// The latest stored generation, `0` if the team has none.
    fn current_generation(&self, id: &TeamId) -> Result<u32>;

    /// Every stored generation, oldest first.
    fn generations(&self, id: &TeamId) -> Result<Vec<TeamKeyGeneration>>;

    /// Append `generation` and commit `state` (the roster it was sealed
    /// for) in one step.
    ///
    /// # Errors
    ///
    /// `GenerationConflict` unless `generation.generation` is exactly the
    /// current generation plus one; `InvalidChain` if `state` does not
    /// describe the same team and generation.
    fn append_generation(&self, state: &TeamState, generation: TeamKeyGeneration) -> Result<()>;
}

#[derive(Debug)]
struct TeamRecord {
    state: TeamState,
    generations: Vec<TeamKeyGeneration>,
}

/// In-process team store.
#[derive(Debug, Default)]
pub struct MemoryTeamStore {
    teams: Mutex<HashMap<TeamId, TeamRecord>>,
}

impl MemoryTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TeamId, TeamRecord>> {
        self.teams.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TeamStore for MemoryTeamStore {
    fn load(&self, id: &TeamId) -> Result<Option<TeamState>> {
        Ok(self.lock().get(id).map(|r| r.state.clone()))
    }

    fn current_generation(&self, id: &TeamId) -> Result<u32> {
        Ok(self
            .lock()
            .get(id)
            .and_then(|r| r.generations.last())
            .map_or(0, |g| g.generation))
    }

    fn generations(&self, id: &TeamId) -> Result<Vec<TeamKeyGeneration>> {
        Ok(self
            .lock()
            .get(id)
            .map(|r| r.generations.clone())
            .unwrap_or_default())
    }

    fn append_generation(&self, state: &TeamState, generation: TeamKeyGeneration) -> Result<()> {
        if state.id != generation.team_id || state.key_generation != generation.generation {
            return Err(TrustError::InvalidChain(format!(
                "roster of {} at generation {} does not match generation {} of {}",
                state.id, state.key_generation, generation.generation, generation.team_id
            )));
        }

        let mut teams = self.lock();
        let current = teams
            .get(&state.id)
            .and_then(|r| r.generations.last())
            .map_or(0, |g| g.generation);
        if generation.generation != current + 1 {
            return Err(TrustError::GenerationConflict {
                team: state.name.clone(),
                attempted: generation.generation,
                current,
            });
        }

        let record = teams.entry(state.id.clone()).or_insert_with(|| TeamRecord {
            state: state.clone(),
            generations: Vec::new(),
        });
        record.state = state.clone();
        record.generations.push(generation);
        Ok(())
    }
}
