//! Stable item identity.
//!
//! Every archetype is addressed by an [`ItemId`]: an `(archetype, name)`
//! pair that stays stable across registry reloads but not across renames.
//! Renames are handled by the redirect resolver, never by mutating ids in
//! place.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of an archetype group, e.g. `"Weapon"`.
///
/// Lexical ordering is load-bearing: the registry state keeps records
/// sorted by `(archetype, name)` and derives replication indices from the
/// sorted position.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArchetypeName(String);

impl ArchetypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for ArchetypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArchetypeName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

/// Name of a single archetype within its group, e.g. `"Sword"`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemName(String);

impl ItemName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

/// Globally unique archetype identifier within one registry.
///
/// The default value is the invalid id; [`ItemId::is_valid`] checks both
/// components. Invalid ids round-trip through persistence and the wire as
/// the reserved "no item" encoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    pub archetype: ArchetypeName,
    pub name: ItemName,
}

impl ItemId {
    pub fn new(archetype: impl Into<ArchetypeName>, name: impl Into<ItemName>) -> Self {
        Self {
            archetype: archetype.into(),
            name: name.into(),
        }
    }

    /// Whether both components are non-empty.
    pub fn is_valid(&self) -> bool {
        self.archetype.is_valid() && self.name.is_valid()
    }

    /// Clears both components back to the invalid id.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.archetype
            .cmp(&other.archetype)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.archetype, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_archetype_then_name() {
        let axe = ItemId::new("Weapon", "Axe");
        let sword = ItemId::new("Weapon", "Sword");
        let potion = ItemId::new("Consumable", "Potion");

        assert!(potion < axe, "Consumable sorts before Weapon");
        assert!(axe < sword, "Axe sorts before Sword within Weapon");
    }

    #[test]
    fn default_is_invalid() {
        let id = ItemId::default();
        assert!(!id.is_valid());
        assert!(ItemId::new("Weapon", "").is_valid() == false);
        assert!(ItemId::new("", "Sword").is_valid() == false);
    }
}
