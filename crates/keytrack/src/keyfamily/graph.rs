//! Key family graph: validation and queries over a user's keys.
//!
//! Parent links and revocations are kept in relation tables keyed by
//! [`Kid`] rather than as pointers between keys, so validation is a
//! plain traversal over maps. A graph is never mutated after `build`;
//! a changed key set produces a new graph which replaces the old one
//! through [`KeyFamilyHandle::replace`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, RwLock};

use crate::error::{Result, TrustError};
use crate::identity::Uid;

use super::types::{DeviceKey, DeviceType, KeyAlgorithm, KeyClass, KeyStatus, Kid, RevokedKey};

/// A validated key family.
#[derive(Debug, Clone)]
pub struct KeyFamilyGraph {
    uid: Uid,
    keys: BTreeMap<Kid, DeviceKey>,
    parents: BTreeMap<Kid, Kid>,
    children: BTreeMap<Kid, Vec<Kid>>,
    revocations: BTreeMap<Kid, RevokedKey>,
}

impl KeyFamilyGraph {
    /// Validate `keys` and `revocations` and build the graph.
    ///
    /// Revoked keys remain members of the family; a key listed in both
    /// inputs is the same node.
    ///
    /// # Errors
    ///
    /// - `DuplicateKid` if a kid is listed twice in `keys`.
    /// - `DanglingParent` if a non-eldest key's parent is absent.
    /// - `Cycle` if following parent links revisits a key.
    /// - `DuplicateDevice` if two unrevoked signing keys claim one device.
    /// - `MultipleEldest` if more than one eldest key is still active.
    /// - `RevokedParent` if an unrevoked key was created under a parent
    ///   after that parent's revocation.
    pub fn build(uid: Uid, keys: Vec<DeviceKey>, revocations: Vec<RevokedKey>) -> Result<Self> {
        let mut nodes: BTreeMap<Kid, DeviceKey> = BTreeMap::new();
        for key in keys {
            let kid = key.kid.clone();
            if nodes.insert(kid.clone(), key).is_some() {
                return Err(TrustError::DuplicateKid { kid });
            }
        }

        let mut revoked: BTreeMap<Kid, RevokedKey> = BTreeMap::new();
        for revocation in revocations {
            let kid = revocation.key.kid.clone();
            nodes
                .entry(kid.clone())
                .or_insert_with(|| revocation.key.clone());
            revoked.insert(kid, revocation);
        }

        let mut parents = BTreeMap::new();
        let mut children: BTreeMap<Kid, Vec<Kid>> = BTreeMap::new();
        for key in nodes.values() {
            if key.is_eldest {
                if key.parent_id.is_some() {
                    return Err(TrustError::InvalidKey(format!(
                        "eldest key {} declares a parent",
                        key.kid.short()
                    )));
                }
                continue;
            }
            let parent = match &key.parent_id {
                Some(p) if nodes.contains_key(p) => p.clone(),
                other => {
                    return Err(TrustError::DanglingParent {
                        kid: key.kid.clone(),
                        parent: other.clone(),
                    })
                }
            };
            children
                .entry(parent.clone())
                .or_default()
                .push(key.kid.clone());
            parents.insert(key.kid.clone(), parent);
        }

        check_acyclic(&parents)?;

        let graph = Self {
            uid,
            keys: nodes,
            parents,
            children,
            revocations: revoked,
        };
        graph.check_devices()?;
        graph.check_eldest()?;
        graph.check_revoked_parents()?;

        log::debug!(
            "built key family for {}: {} keys, {} revoked",
            graph.uid,
            graph.keys.len(),
            graph.revocations.len()
        );
        Ok(graph)
    }

    fn check_devices(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for key in self.keys.values() {
            if !key.is_signing_key() || self.is_revoked(&key.kid) {
                continue;
            }
            if !seen.insert(key.device_id.as_str()) {
                return Err(TrustError::DuplicateDevice {
                    device_id: key.device_id.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_eldest(&self) -> Result<()> {
        let live: Vec<Kid> = self
            .keys
            .values()
            .filter(|k| k.is_eldest && k.status == KeyStatus::Active && !self.is_revoked(&k.kid))
            .map(|k| k.kid.clone())
            .collect();
        if live.len() > 1 {
            return Err(TrustError::MultipleEldest { kids: live });
        }
        Ok(())
    }

    fn check_revoked_parents(&self) -> Result<()> {
        for (kid, parent) in &self.parents {
            if self.is_revoked(kid) {
                continue;
            }
            let (Some(key), Some(revocation)) = (self.keys.get(kid), self.revocations.get(parent))
            else {
                continue;
            };
            if key.created_at > revocation.revoked_at {
                return Err(TrustError::RevokedParent {
                    kid: kid.clone(),
                    parent: parent.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Every key in the family, revoked or not, ordered by kid.
    pub fn keys(&self) -> impl Iterator<Item = &DeviceKey> {
        self.keys.values()
    }

    pub fn lookup(&self, kid: &Kid) -> Result<&DeviceKey> {
        self.keys
            .get(kid)
            .ok_or_else(|| TrustError::NotFound(format!("key {} in family of {}", kid, self.uid)))
    }

    pub fn parent(&self, kid: &Kid) -> Option<&DeviceKey> {
        self.parents.get(kid).and_then(|p| self.keys.get(p))
    }

    pub fn children(&self, kid: &Kid) -> Vec<&DeviceKey> {
        self.children
            .get(kid)
            .map(|kids| kids.iter().filter_map(|k| self.keys.get(k)).collect())
            .unwrap_or_default()
    }

    pub fn revocation(&self, kid: &Kid) -> Option<&RevokedKey> {
        self.revocations.get(kid)
    }

    pub fn is_revoked(&self, kid: &Kid) -> bool {
        self.revocations.contains_key(kid)
    }

    /// Classify a key by walking one parent hop: keys under a paper key
    /// are backup keys, everything else present is a device key.
    pub fn classify(&self, kid: &Kid) -> KeyClass {
        if !self.keys.contains_key(kid) {
            return KeyClass::Unknown;
        }
        match self.parent(kid) {
            Some(parent) if parent.device_type == DeviceType::Paper => KeyClass::Backup,
            _ => KeyClass::Device,
        }
    }

    /// Whether `kid` is usable at `now`: present, unrevoked, active,
    /// unexpired, and every ancestor is usable too.
    pub fn is_active(&self, kid: &Kid, now: u64) -> bool {
        let mut current = Some(kid);
        while let Some(k) = current {
            let Some(key) = self.keys.get(k) else {
                return false;
            };
            if self.is_revoked(k) || key.status != KeyStatus::Active || key.is_expired(now) {
                return false;
            }
            current = self.parents.get(k);
        }
        true
    }

    /// The key this user signs with: the active eldest key if there is
    /// one, otherwise the newest active non-paper sibkey, otherwise the
    /// newest active paper sibkey.
    pub fn active_signing_key(&self, now: u64) -> Result<&DeviceKey> {
        self.keys
            .values()
            .filter(|k| k.is_signing_key() && self.is_active(&k.kid, now))
            .filter(|k| k.kid.algorithm() == Some(KeyAlgorithm::Ed25519))
            .max_by_key(|k| (k.is_eldest, k.device_type != DeviceType::Paper, k.created_at))
            .ok_or_else(|| TrustError::NoVerifiableKey {
                uid: self.uid.to_string(),
            })
    }

    /// Active signing keys other than the eldest key.
    pub fn sibkeys(&self, now: u64) -> Vec<&DeviceKey> {
        self.keys
            .values()
            .filter(|k| k.is_sibkey && self.is_active(&k.kid, now))
            .collect()
    }

    /// Active per-device encryption subkeys, each with its class.
    pub fn encryption_keys(&self, now: u64) -> Vec<(KeyClass, &DeviceKey)> {
        self.keys
            .values()
            .filter(|k| !k.is_signing_key() && k.kid.algorithm() == Some(KeyAlgorithm::X25519))
            .filter(|k| self.is_active(&k.kid, now))
            .map(|k| (self.classify(&k.kid), k))
            .collect()
    }

    /// Snapshot of the kids of every active key.
    pub fn fingerprints(&self, now: u64) -> BTreeSet<Kid> {
        self.keys
            .keys()
            .filter(|kid| self.is_active(kid, now))
            .cloned()
            .collect()
    }
}

/// Every parent chain must end at a key without a parent.
fn check_acyclic(parents: &BTreeMap<Kid, Kid>) -> Result<()> {
    let mut reaches_root: HashSet<&Kid> = HashSet::new();
    for start in parents.keys() {
        let mut path: Vec<&Kid> = Vec::new();
        let mut on_path: HashSet<&Kid> = HashSet::new();
        let mut current = start;
        loop {
            if reaches_root.contains(current) {
                break;
            }
            if !on_path.insert(current) {
                return Err(TrustError::Cycle {
                    kid: current.clone(),
                });
            }
            path.push(current);
            match parents.get(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        reaches_root.extend(path);
    }
    Ok(())
}

/// Shared, atomically replaceable reference to a user's current graph.
#[derive(Debug)]
pub struct KeyFamilyHandle {
    current: RwLock<Arc<KeyFamilyGraph>>,
}

impl KeyFamilyHandle {
    pub fn new(graph: KeyFamilyGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
        }
    }

    pub fn current(&self) -> Arc<KeyFamilyGraph> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Rebuild from a changed key set. On validation failure the previous
    /// graph stays in place.
    pub fn replace(
        &self,
        keys: Vec<DeviceKey>,
        revocations: Vec<RevokedKey>,
    ) -> Result<Arc<KeyFamilyGraph>> {
        let uid = self.current().uid().clone();
        let graph = Arc::new(KeyFamilyGraph::build(uid, keys, revocations)?);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&graph);
        Ok(graph)
    }
}
