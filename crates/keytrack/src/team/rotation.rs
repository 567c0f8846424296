//! Team key rotation.
//!
//! Each membership change produces the next key generation: a fresh
//! random secret sealed to every active encryption key of every member.
//! Rotations are exclusive per team. A request for a team that is already
//! rotating is rejected with `RotationInProgress`, not queued. Nothing is
//! stored until every box is sealed, so a failed rotation leaves the
//! generation counter where it was.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::crypto::derivation::team_seal_context;
use crate::crypto::encryption::{self, SealedBox};
use crate::crypto::random_array;
use crate::error::{Result, TrustError};
use crate::identity::KeyDirectory;
use crate::keyfamily::Kid;
use crate::storage::TeamStore;
use crate::time::{Clock, SystemClock};

use super::types::{MembershipChange, TeamId, TeamKeyGeneration, TeamSecret, TeamState};

/// Marks a team as rotating until dropped.
struct InFlight<'a> {
    teams: &'a Mutex<HashSet<TeamId>>,
    team: TeamId,
}

impl<'a> InFlight<'a> {
    fn acquire(teams: &'a Mutex<HashSet<TeamId>>, team: &TeamId, name: &str) -> Result<Self> {
        let mut in_flight = teams.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(team.clone()) {
            return Err(TrustError::RotationInProgress {
                team: name.to_string(),
            });
        }
        Ok(Self {
            teams,
            team: team.clone(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.teams.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.team);
    }
}

/// Derives and distributes team key generations.
pub struct TeamKeyRotationCoordinator {
    directory: Arc<dyn KeyDirectory>,
    store: Arc<dyn TeamStore>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashSet<TeamId>>,
}

impl TeamKeyRotationCoordinator {
    pub fn new(directory: Arc<dyn KeyDirectory>, store: Arc<dyn TeamStore>) -> Self {
        Self {
            directory,
            store,
            clock: Arc::new(SystemClock),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn TeamStore> {
        &self.store
    }

    /// Apply `change` to the team and store generation `current + 1`.
    ///
    /// # Errors
    ///
    /// - `RotationInProgress` if another rotation of this team is running.
    /// - `TeamExists`, `NotFound`, `AlreadyMember`, `NotMember` for a change
    ///   that does not fit the current roster.
    /// - `LastOwner` if the change removes the team's only owner.
    /// - `NoVerifiableKey` if a member has no active encryption key.
    /// - `NoRecipients` if the roster would leave nobody to seal the secret to.
    /// - `GenerationConflict` if another writer stored a generation first.
    pub fn rotate(&self, team_id: &TeamId, change: MembershipChange) -> Result<TeamKeyGeneration> {
        let name = match &change {
            MembershipChange::Created { name, .. } => name.clone(),
            _ => team_id.to_string(),
        };
        let _in_flight = InFlight::acquire(&self.in_flight, team_id, &name)?;

        let now = self.clock.now_micros();
        let mut state = match (self.store.load(team_id)?, &change) {
            (None, MembershipChange::Created { name, owner }) => {
                let state = TeamState::genesis(name.clone(), owner.clone(), now);
                if &state.id != team_id {
                    return Err(TrustError::InvalidKey(format!(
                        "team {name} does not have id {team_id}"
                    )));
                }
                state
            }
            (None, _) => return Err(TrustError::NotFound(format!("team {team_id}"))),
            (Some(current), change) => current.apply(change)?,
        };

        let generation = self.store.current_generation(team_id)? + 1;
        let secret = TeamSecret::new(random_array());
        let encrypted_key_material = self.seal_for_members(&state, generation, &secret)?;
        if encrypted_key_material.is_empty() {
            return Err(TrustError::NoRecipients { team: state.name });
        }
        state.key_generation = generation;

        let record = TeamKeyGeneration {
            team_id: team_id.clone(),
            generation,
            encrypted_key_material,
            created_at: now,
        };
        self.store.append_generation(&state, record.clone())?;

        log::info!(
            "team {} rotated to generation {} ({} members, {} boxes)",
            state.name,
            generation,
            state.members.len(),
            record.encrypted_key_material.len()
        );
        Ok(record)
    }

    fn seal_for_members(
        &self,
        state: &TeamState,
        generation: u32,
        secret: &TeamSecret,
    ) -> Result<BTreeMap<Kid, SealedBox>> {
        let now = self.clock.now_micros();
        let context = team_seal_context(state.id.as_str(), generation);
        let mut boxes = BTreeMap::new();
        for member in state.members.values() {
            let graph = self.directory.load_key_family(&member.uid)?;
            let recipients = graph.encryption_keys(now);
            if recipients.is_empty() {
                return Err(TrustError::NoVerifiableKey {
                    uid: member.uid.to_string(),
                });
            }
            for (class, key) in recipients {
                let public = key.kid.x25519_key()?;
                let sealed = encryption::seal(&public, secret.as_bytes(), &context)?;
                log::debug!(
                    "sealed generation {generation} of {} for {} ({class:?} key {})",
                    state.name,
                    member.username,
                    key.kid.short()
                );
                boxes.insert(key.kid.clone(), sealed);
            }
        }
        Ok(boxes)
    }
}
