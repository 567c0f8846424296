//! Team operations exposed to callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Result, TrustError};
use crate::identity::{AuthContext, KeyDirectory, Session};
use crate::storage::TeamStore;
use crate::time::Clock;

use super::poller::TeamStateSource;
use super::rotation::TeamKeyRotationCoordinator;
use super::types::{MembershipChange, TeamId, TeamKeyGeneration, TeamMember, TeamRole, TeamState};

/// `TeamCreate`, `TeamAddMember`, `TeamRemoveMember`, `TeamGet`, and rekey.
///
/// Every membership change goes through the rotation coordinator, so the
/// roster and its key generation always move together.
pub struct TeamService {
    directory: Arc<dyn KeyDirectory>,
    coordinator: TeamKeyRotationCoordinator,
    cache: Mutex<HashMap<TeamId, TeamState>>,
}

impl TeamService {
    pub fn new(directory: Arc<dyn KeyDirectory>, store: Arc<dyn TeamStore>) -> Self {
        let coordinator = TeamKeyRotationCoordinator::new(Arc::clone(&directory), store);
        Self {
            directory,
            coordinator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.coordinator = self.coordinator.with_clock(clock);
        self
    }

    pub fn coordinator(&self) -> &TeamKeyRotationCoordinator {
        &self.coordinator
    }

    /// Create a team owned by the logged-in user; its first generation is
    /// sealed to the owner.
    pub fn create(&self, auth: &AuthContext, name: &str) -> Result<TeamKeyGeneration> {
        let session = auth.require_login()?;
        let owner = TeamMember::new(session.uid.clone(), session.username.clone(), TeamRole::Owner);
        let generation = self.coordinator.rotate(
            &TeamId::from_name(name),
            MembershipChange::Created {
                name: name.to_string(),
                owner,
            },
        )?;
        self.refresh(&generation.team_id)?;
        Ok(generation)
    }

    /// Add `username` with `role` and rotate.
    pub fn add_member(
        &self,
        auth: &AuthContext,
        team: &str,
        username: &str,
        role: TeamRole,
    ) -> Result<TeamKeyGeneration> {
        let state = self.authorize(auth, team)?;
        let uid = self.directory.lookup_username(username)?;
        let member = TeamMember::new(uid, username, role);
        self.change(&state.id, MembershipChange::Added(member))
    }

    /// Remove `username` and rotate, so the removed member cannot read
    /// anything sealed under later generations.
    pub fn remove_member(
        &self,
        auth: &AuthContext,
        team: &str,
        username: &str,
    ) -> Result<TeamKeyGeneration> {
        let state = self.authorize(auth, team)?;
        let uid = state
            .members
            .values()
            .find(|m| m.username.eq_ignore_ascii_case(username))
            .map(|m| m.uid.clone())
            .ok_or_else(|| TrustError::NotMember {
                team: state.name.clone(),
                username: username.to_string(),
            })?;
        self.change(&state.id, MembershipChange::Removed(uid))
    }

    /// Rotate without a membership change.
    pub fn rekey(&self, auth: &AuthContext, team: &str) -> Result<TeamKeyGeneration> {
        let state = self.authorize(auth, team)?;
        self.change(&state.id, MembershipChange::Rekey)
    }

    /// The team's state; the cached snapshot unless `force_repoll`.
    pub fn get(&self, team: &str, force_repoll: bool) -> Result<TeamState> {
        let id = TeamId::from_name(team);
        if !force_repoll {
            if let Some(state) = self.lock().get(&id) {
                return Ok(state.clone());
            }
        }
        self.refresh(&id)
    }

    /// Every generation of the team, oldest first.
    pub fn generations(&self, team: &str) -> Result<Vec<TeamKeyGeneration>> {
        self.coordinator
            .store()
            .generations(&TeamId::from_name(team))
    }

    fn change(&self, id: &TeamId, change: MembershipChange) -> Result<TeamKeyGeneration> {
        let generation = self.coordinator.rotate(id, change)?;
        self.refresh(id)?;
        Ok(generation)
    }

    fn refresh(&self, id: &TeamId) -> Result<TeamState> {
        let state = self
            .coordinator
            .store()
            .load(id)?
            .ok_or_else(|| TrustError::NotFound(format!("team {id}")))?;
        self.lock().insert(id.clone(), state.clone());
        Ok(state)
    }

    /// Fresh state of `team`, if the caller may manage it.
    fn authorize(&self, auth: &AuthContext, team: &str) -> Result<TeamState> {
        let session: &Session = auth.require_login()?;
        let state = self.get(team, true)?;
        match state.member(&session.uid) {
            Some(member) if member.role.can_manage() => Ok(state),
            _ => Err(TrustError::PermissionDenied {
                team: state.name.clone(),
                username: session.username.clone(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TeamId, TeamState>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TeamStateSource for TeamService {
    fn fetch(&self, team: &str) -> Result<TeamState> {
        self.get(team, true)
    }
}
