//! Key families: the per-user graph of device keys, backup keys,
//! encryption subkeys, and their revocations.

pub mod graph;
pub mod types;

pub use graph::{KeyFamilyGraph, KeyFamilyHandle};
pub use types::{DeviceKey, DeviceType, KeyAlgorithm, KeyClass, KeyStatus, Kid, RevokedKey};
