//! Read-only view of the players the host knows about.
//!
//! The host thread publishes a fresh [`PlayerSnapshot`] whenever something
//! about a player changes. Render threads only ever see whole snapshots.

use byteorder::{BigEndian, ByteOrder};
use rustc_hash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone)]
enum PathSegment {
    WildCard,
    Named(String),
}

#[derive(Debug, Clone)]
struct PermissionNode {
    path: Vec<PathSegment>,
    value: bool,
}

impl PermissionNode {
    fn matches(&self, str: &str) -> bool {
        let mut segments = str.split('.');
        for node_segment in &self.path {
            match (node_segment, segments.next()) {
                (PathSegment::WildCard, Some(_)) => return true,
                (PathSegment::Named(name), Some(segment)) if name == segment => {}
                _ => return false,
            }
        }
        segments.next().is_none()
    }
}

/// Permission nodes granted to or revoked from a player.
///
/// Nodes are dotted paths. A `*` segment matches the rest of the path, so
/// `chatr.*` grants `chatr.chat.color`. When several nodes match, the one
/// with the longest path wins.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    nodes: Vec<PermissionNode>,
}

impl PermissionSet {
    pub fn new() -> PermissionSet {
        Default::default()
    }

    pub fn get_node_val(&self, name: &str) -> Option<bool> {
        self.nodes
            .iter()
            .filter(|node| node.matches(name))
            .max_by_key(|node| node.path.len())
            .map(|node| node.value)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get_node_val(name).unwrap_or(false)
    }

    pub fn insert(&mut self, name: &str, value: bool) {
        let path = name
            .split('.')
            .map(|s| match s {
                "*" => PathSegment::WildCard,
                s => PathSegment::Named(s.to_owned()),
            })
            .collect();
        self.nodes.push(PermissionNode { path, value });
    }

    pub fn grant(mut self, name: &str) -> PermissionSet {
        self.insert(name, true);
        self
    }

    pub fn revoke(mut self, name: &str) -> PermissionSet {
        self.insert(name, false);
        self
    }
}

#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub uuid: u128,
    pub name: String,
    pub display_name: Option<String>,
    pub world: Option<String>,
    pub permissions: PermissionSet,
}

impl PlayerSnapshot {
    pub fn new(uuid: u128, name: impl Into<String>) -> PlayerSnapshot {
        PlayerSnapshot {
            uuid,
            name: name.into(),
            display_name: None,
            world: None,
            permissions: PermissionSet::new(),
        }
    }

    /// Snapshot of an offline mode player, keyed by the uuid the vanilla
    /// server would assign.
    pub fn offline(name: impl Into<String>) -> PlayerSnapshot {
        let name = name.into();
        PlayerSnapshot::new(offline_uuid(&name), name)
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> PlayerSnapshot {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_world(mut self, world: impl Into<String>) -> PlayerSnapshot {
        self.world = Some(world.into());
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> PlayerSnapshot {
        self.permissions = permissions;
        self
    }

    pub fn has_permission(&self, node: &str) -> bool {
        self.permissions.has(node)
    }

    pub fn shown_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

pub trait PlayerRegistry: Send + Sync {
    fn snapshot(&self, uuid: u128) -> Option<Arc<PlayerSnapshot>>;

    fn online(&self) -> Vec<Arc<PlayerSnapshot>>;
}

/// A [`PlayerRegistry`] the host keeps current by publishing snapshots.
#[derive(Default)]
pub struct SnapshotRegistry {
    players: RwLock<FxHashMap<u128, Arc<PlayerSnapshot>>>,
}

impl SnapshotRegistry {
    pub fn new() -> SnapshotRegistry {
        Default::default()
    }

    /// Replaces the snapshot of the player, or adds the player.
    pub fn publish(&self, snapshot: PlayerSnapshot) {
        self.players
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.uuid, Arc::new(snapshot));
    }

    pub fn remove(&self, uuid: u128) -> Option<Arc<PlayerSnapshot>> {
        self.players
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&uuid)
    }
}

impl PlayerRegistry for SnapshotRegistry {
    fn snapshot(&self, uuid: u128) -> Option<Arc<PlayerSnapshot>> {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&uuid)
            .cloned()
    }

    fn online(&self) -> Vec<Arc<PlayerSnapshot>> {
        let mut online: Vec<_> = self
            .players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        online.sort_by(|a, b| a.name.cmp(&b.name));
        online
    }
}

/// The uuid an offline mode server gives the player `username`.
pub fn offline_uuid(username: &str) -> u128 {
    BigEndian::read_u128(&md5::compute(format!("OfflinePlayer:{}", username)).0)
        // Encode version and varient into uuid
        & (!(0xC << 60) & !(0xF << 76))
        | ((0x8 << 60) | (0x3 << 76))
}
