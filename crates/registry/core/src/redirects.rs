//! Archetype and name redirects.
//!
//! Renames do not rewrite stored identifiers; instead the settings carry
//! redirect edges (`old -> new`) per axis — one table for archetype names,
//! one for item names. Raw edge lists are collapsed into flat lookup maps
//! at build time: chains resolve to their terminal value, cyclic chains
//! are dropped and logged, ambiguous edges are skipped. The two axes are
//! independent, so a historically renamed item may be reachable through
//! any permutation of old types and old names.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::id::{ArchetypeName, ItemId, ItemName};

/// One raw redirect edge as it appears in the settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirector {
    pub old_value: String,
    pub new_value: String,
}

impl Redirector {
    pub fn new(old_value: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.old_value.is_empty() && !self.new_value.is_empty() && self.old_value != self.new_value
    }

    pub fn swap_values(&mut self) {
        std::mem::swap(&mut self.old_value, &mut self.new_value);
    }
}

/// Builds the raw (uncollapsed) redirection map from an edge list.
///
/// Invalid edges and edges whose `old` side is already mapped (ambiguous)
/// are skipped with a warning.
fn generate_redirection_map(redirects: &[Redirector]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();

    for redirect in redirects {
        if !redirect.is_valid() {
            warn!(
                old = %redirect.old_value,
                new = %redirect.new_value,
                "found invalid redirector"
            );
            continue;
        }

        if map.contains_key(&redirect.old_value) {
            warn!(
                old = %redirect.old_value,
                new = %redirect.new_value,
                "found ambiguous redirector"
            );
            continue;
        }

        map.insert(redirect.old_value.clone(), redirect.new_value.clone());
    }

    map
}

/// Chases a chain from `value` to its terminal, with an optional stop
/// value. Returns the resolved value and whether it differs from the
/// input. A chain that revisits a value is cyclic: resolution fails back
/// to the input.
fn resolve_value(
    raw: &BTreeMap<String, String>,
    value: &str,
    stop_value: Option<&str>,
) -> (String, bool) {
    let mut visited: HashSet<&str> = HashSet::from([value]);
    let mut current = value;

    while let Some(next) = raw.get(current) {
        if stop_value == Some(next.as_str()) {
            current = next;
            break;
        }

        if visited.contains(next.as_str()) {
            error!(
                from = %value,
                to = %current,
                "failed to collapse redirector due to circular dependency"
            );
            return (value.to_owned(), false);
        }

        visited.insert(current);
        current = next;
    }

    (current.to_owned(), current != value)
}

/// Collapses a raw redirection map into a flat lookup map.
///
/// Every key resolves directly to its terminal value; chains that loop
/// back on themselves are dropped entirely and logged.
fn resolve_redirection_map(raw: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut resolved: BTreeMap<String, String> = BTreeMap::new();
    let mut invalid: HashSet<String> = HashSet::new();

    for (old_value, new_value) in raw {
        // Reuse a previously resolved suffix.
        if let Some(terminal) = resolved.get(new_value) {
            let terminal = terminal.clone();
            resolved.insert(old_value.clone(), terminal);
            continue;
        }

        if invalid.contains(new_value) {
            invalid.insert(old_value.clone());
            continue;
        }

        let mut visited: Vec<String> = vec![old_value.clone()];
        let mut current = new_value.clone();

        let terminal = loop {
            let Some(next) = raw.get(&current) else {
                break Some(current);
            };

            visited.push(current.clone());

            if let Some(terminal) = resolved.get(next) {
                break Some(terminal.clone());
            }

            if visited.iter().any(|seen| seen == next) || invalid.contains(next) {
                break None;
            }

            current = next.clone();
        };

        match terminal {
            Some(terminal) => {
                for key in visited {
                    resolved.insert(key, terminal.clone());
                }
            }
            None => {
                error!(
                    keys = ?visited,
                    "failed to resolve redirection chain due to circular dependency"
                );
                invalid.extend(visited);
            }
        }
    }

    resolved
}

/// Flattened archetype/name redirect lookup.
///
/// Chain collapsing, cycle elimination and ambiguity rejection all happen
/// at construction; lookups afterwards are single-hop.
#[derive(Clone, Debug, Default)]
pub struct Redirects {
    archetype_map: BTreeMap<String, String>,
    name_map: BTreeMap<String, String>,
}

impl Redirects {
    /// Builds the resolved lookup from raw edge lists.
    pub fn from_raw(archetype_redirects: &[Redirector], name_redirects: &[Redirector]) -> Self {
        Self {
            archetype_map: resolve_redirection_map(&generate_redirection_map(archetype_redirects)),
            name_map: resolve_redirection_map(&generate_redirection_map(name_redirects)),
        }
    }

    pub fn archetype_redirects(&self) -> &BTreeMap<String, String> {
        &self.archetype_map
    }

    pub fn name_redirects(&self) -> &BTreeMap<String, String> {
        &self.name_map
    }

    /// Whether the archetype has an active outgoing redirect.
    pub fn is_stale_archetype(&self, archetype: &ArchetypeName) -> bool {
        self.archetype_map.contains_key(archetype.as_str())
    }

    /// Whether any component of the id has an active outgoing redirect.
    pub fn is_stale(&self, id: &ItemId) -> bool {
        self.name_map.contains_key(id.name.as_str())
            || self.archetype_map.contains_key(id.archetype.as_str())
    }

    /// Redirects the archetype in place if a mapping exists.
    pub fn try_redirect_archetype(&self, archetype: &mut ArchetypeName) -> bool {
        if let Some(new_value) = self.archetype_map.get(archetype.as_str()) {
            *archetype = ArchetypeName::new(new_value.clone());
            return true;
        }

        false
    }

    /// Redirects either component of the id in place. Returns whether
    /// anything changed.
    pub fn try_redirect(&self, id: &mut ItemId) -> bool {
        let mut dirty = false;

        if let Some(new_value) = self.name_map.get(id.name.as_str()) {
            id.name = ItemName::new(new_value.clone());
            dirty = true;
        }

        if let Some(new_value) = self.archetype_map.get(id.archetype.as_str()) {
            id.archetype = ArchetypeName::new(new_value.clone());
            dirty = true;
        }

        dirty
    }

    /// Whether the archetype appears on either side of a redirect.
    pub fn has_archetype_redirects(&self, archetype: &ArchetypeName) -> bool {
        self.archetype_map.contains_key(archetype.as_str())
            || self
                .archetype_map
                .values()
                .any(|value| value == archetype.as_str())
    }

    /// Whether the item name appears on either side of a redirect.
    pub fn has_name_redirects(&self, name: &ItemName) -> bool {
        self.name_map.contains_key(name.as_str())
            || self.name_map.values().any(|value| value == name.as_str())
    }

    /// Traverses every historical identity permutation of `id`, calling
    /// the predicate until it returns `false`.
    ///
    /// Order: same-archetype/old-name variants first, then old-archetype/
    /// same-name variants, then the full old-archetype × old-name cross
    /// product. Without timestamps the original chain cannot be rebuilt,
    /// but the yielded identities never overlap with unrelated values.
    pub fn traverse_permutations(
        &self,
        id: &ItemId,
        mut predicate: impl FnMut(ItemId) -> bool,
    ) {
        for (old_name, new_name) in &self.name_map {
            if new_name == id.name.as_str()
                && !predicate(ItemId::new(id.archetype.as_str(), old_name.as_str()))
            {
                return;
            }
        }

        for (old_archetype, new_archetype) in &self.archetype_map {
            if new_archetype == id.archetype.as_str()
                && !predicate(ItemId::new(old_archetype.as_str(), id.name.as_str()))
            {
                return;
            }
        }

        for (old_archetype, new_archetype) in &self.archetype_map {
            if new_archetype != id.archetype.as_str() {
                continue;
            }

            for (old_name, new_name) in &self.name_map {
                if new_name == id.name.as_str()
                    && !predicate(ItemId::new(old_archetype.as_str(), old_name.as_str()))
                {
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Static helpers over raw edge lists
    // ------------------------------------------------------------------

    /// Whether `original` resolves (transitively) into `target`.
    pub fn can_resolve_into(redirects: &[Redirector], original: &str, target: &str) -> bool {
        if original == target {
            return false;
        }

        let raw = generate_redirection_map(redirects);
        let (resolved, changed) = resolve_value(&raw, original, Some(target));
        changed && resolved == target
    }

    /// Whether both values resolve into the same terminal value.
    pub fn has_common_base(redirects: &[Redirector], first: &str, second: &str) -> bool {
        let raw = generate_redirection_map(redirects);
        let (resolved_first, changed) = resolve_value(&raw, first, None);

        if !changed {
            return false;
        }

        if resolved_first == second {
            return true;
        }

        let (resolved_second, changed) = resolve_value(&raw, second, None);
        changed && resolved_first == resolved_second
    }

    /// Tries to insert a new redirect edge, keeping the list acyclic and
    /// unambiguous. All-or-nothing: on failure the list is unchanged.
    ///
    /// If `new_value` already starts an existing chain, insertion would
    /// concatenate chains and is rejected — unless `invert_on_cycle` is
    /// set and the chain starting at `new_value` resolves back into
    /// `old_value`, in which case every edge along that chain is inverted
    /// so the new edge fits without forming a cycle.
    pub fn append_redirects(
        redirects: &mut Vec<Redirector>,
        old_value: &str,
        new_value: &str,
        invert_on_cycle: bool,
    ) -> bool {
        if old_value == new_value {
            warn!(old = %old_value, new = %new_value, "failed to insert self-redirector");
            return false;
        }

        let raw = generate_redirection_map(redirects);

        if raw.contains_key(old_value) {
            warn!(old = %old_value, new = %new_value, "failed to insert ambiguous redirector");
            return false;
        }

        if !raw.contains_key(new_value) {
            redirects.push(Redirector::new(old_value, new_value));
            return true;
        }

        if invert_on_cycle {
            let (resolved, changed) = resolve_value(&raw, new_value, None);

            if !changed {
                warn!(
                    old = %old_value,
                    new = %new_value,
                    "rejected redirector: concatenation into a circular dependency"
                );
                return false;
            }

            if resolved != old_value {
                warn!(
                    old = %old_value,
                    new = %new_value,
                    "rejected redirector: concatenation of redirect chains"
                );
                return false;
            }

            // Invert the whole chain starting at `new_value`.
            let mut current = new_value.to_owned();
            while let Some(next) = raw.get(&current).cloned() {
                if let Some(edge) = redirects
                    .iter_mut()
                    .find(|edge| edge.old_value == current && edge.new_value == next)
                {
                    edge.swap_values();
                }

                current = next;
            }

            return true;
        }

        error!(
            old = %old_value,
            new = %new_value,
            "rejected redirector: concatenation of redirect chains"
        );
        false
    }

    /// Removes every redirect that resolves (optionally transitively)
    /// into `target`. Returns whether any edges were removed.
    pub fn cleanup_redirects(
        redirects: &mut Vec<Redirector>,
        target: &str,
        recursive: bool,
    ) -> bool {
        let mut cleanup_keys: HashSet<String> = HashSet::from([target.to_owned()]);

        if recursive {
            let raw = generate_redirection_map(redirects);
            let mut invalid: HashSet<String> = HashSet::new();

            for (old_value, new_value) in &raw {
                let mut visited: HashSet<String> = HashSet::new();
                let mut current = old_value.clone();
                let mut next = Some(new_value.clone());

                loop {
                    if visited.contains(&current) || invalid.contains(&current) {
                        break;
                    }

                    if cleanup_keys.contains(&current) {
                        current = target.to_owned();
                        break;
                    }

                    visited.insert(current.clone());

                    match next {
                        Some(value) => {
                            current = value;
                            next = raw.get(&current).cloned();
                        }
                        None => break,
                    }
                }

                if current == target {
                    cleanup_keys.extend(visited);
                } else {
                    invalid.extend(visited);
                }
            }
        }

        let before = redirects.len();
        redirects.retain(|edge| !cleanup_keys.contains(&edge.old_value));
        redirects.len() != before
    }
}
