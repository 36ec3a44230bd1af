// src/containment.rs
//
// =============================================================================
// LABTWIN: CONTAINMENT MODEL (v 0.3 )
// =============================================================================
//
// Who holds whom.
//
// Responsibilities:
// 1. Fixed-capacity slot tables for containers.
// 2. The single relocation path that keeps both halves of a link in sync.
// 3. Ancestry walks (`get_container`) and resource closures.
//
// Invariant: slot S of container C holds X  <=>  X.placement == (C, S).

use crate::core::{Identifier, LabObject, ObjectKind};
use crate::error::{ContainmentError, RegistryError};
use crate::lab::Lab;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Key of the only slot of a single-slot container.
pub const SINGLE_SLOT: &str = "SLOT";

// ============================================================================
// 1. DATA STRUCTURES
// ============================================================================

/// Back-reference from a containee to its holder. A weak relation: the
/// containee never owns its container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub container: Identifier,
    pub slot: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    keys: Vec<String>,
    occupied: BTreeMap<String, Identifier>,
    /// Empty means "accepts any containee kind".
    accepts: Vec<ObjectKind>,
}

impl SlotTable {
    pub fn single(accepts: Vec<ObjectKind>) -> Self {
        Self::named(&[SINGLE_SLOT], accepts)
    }

    /// Slots keyed "1".."capacity"; a capacity of 1 collapses to `SLOT`.
    pub fn numbered(capacity: usize, accepts: Vec<ObjectKind>) -> Self {
        if capacity <= 1 {
            return Self::single(accepts);
        }
        let keys: Vec<String> = (1..=capacity).map(|i| i.to_string()).collect();
        Self {
            keys,
            occupied: BTreeMap::new(),
            accepts,
        }
    }

    pub fn named(keys: &[&str], accepts: Vec<ObjectKind>) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            occupied: BTreeMap::new(),
            accepts,
        }
    }

    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn has_slot(&self, slot: &str) -> bool {
        self.keys.iter().any(|k| k == slot)
    }

    pub fn occupant(&self, slot: &str) -> Option<&Identifier> {
        self.occupied.get(slot)
    }

    /// Every declared slot with its occupant, in declaration order.
    pub fn slot_content(&self) -> Vec<(String, Option<Identifier>)> {
        self.keys
            .iter()
            .map(|k| (k.clone(), self.occupied.get(k).cloned()))
            .collect()
    }

    /// Declared keys minus occupied keys, in declaration order.
    pub fn empty_slot_keys(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter(|k| !self.occupied.contains_key(*k))
            .cloned()
            .collect()
    }

    pub fn contained(&self) -> impl Iterator<Item = &Identifier> {
        self.keys.iter().filter_map(|k| self.occupied.get(k))
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }

    pub fn accepts(&self) -> &[ObjectKind] {
        &self.accepts
    }

    pub fn accepts_kind(&self, kind: ObjectKind) -> bool {
        self.accepts.is_empty() || self.accepts.contains(&kind)
    }

    pub(crate) fn set_accepts(&mut self, kinds: Vec<ObjectKind>) {
        self.accepts = kinds;
    }

    fn attach(&mut self, slot: &str, id: &str) {
        self.occupied.insert(slot.to_string(), id.to_string());
    }

    fn detach(&mut self, slot: &str) -> Option<Identifier> {
        self.occupied.remove(slot)
    }
}

// ============================================================================
// 2. RELOCATION (the only path that edits either side of a link)
// ============================================================================

impl Lab {
    /// Moves `containee` into `dest_slot` of `dest_container`.
    ///
    /// Every check runs before the first mutation, so a failure leaves both
    /// sides untouched. Moving an object onto its current slot is a no-op.
    pub fn move_object(
        &mut self,
        containee: &str,
        dest_container: &str,
        dest_slot: &str,
    ) -> Result<(), ContainmentError> {
        let source = self.check_source_link(containee)?;

        if let Some(src) = &source {
            if src.container == dest_container && src.slot == dest_slot {
                return Ok(());
            }
        }

        let moving = self.get(containee)?;
        let kind = moving.kind();
        let dest = self.get(dest_container)?;
        let table = dest
            .slots()
            .ok_or_else(|| ContainmentError::NotAContainer(dest_container.to_string()))?;

        if !table.has_slot(dest_slot) {
            return Err(ContainmentError::UnknownSlot {
                container: dest_container.to_string(),
                slot: dest_slot.to_string(),
            });
        }
        if let Some(occupant) = table.occupant(dest_slot) {
            return Err(ContainmentError::SlotOccupied {
                container: dest_container.to_string(),
                slot: dest_slot.to_string(),
                occupant: occupant.clone(),
            });
        }
        if !table.accepts_kind(kind) {
            return Err(ContainmentError::NotAccepted {
                container: dest_container.to_string(),
                kind,
            });
        }
        if dest_container == containee || self.ancestors(dest_container)?.iter().any(|a| a == containee)
        {
            return Err(ContainmentError::CyclicContainment {
                containee: containee.to_string(),
                container: dest_container.to_string(),
            });
        }

        self.relink(
            containee,
            source,
            Some(SlotRef {
                container: dest_container.to_string(),
                slot: dest_slot.to_string(),
            }),
        );
        log::debug!("moved {} -> {}[{}]", containee, dest_container, dest_slot);
        Ok(())
    }

    /// Moves `containee` into the first empty slot of `dest_container`.
    pub fn move_to_first_empty(
        &mut self,
        containee: &str,
        dest_container: &str,
    ) -> Result<String, ContainmentError> {
        let dest = self.get(dest_container)?;
        let table = dest
            .slots()
            .ok_or_else(|| ContainmentError::NotAContainer(dest_container.to_string()))?;
        let slot = match table.empty_slot_keys().into_iter().next() {
            Some(s) => s,
            None => {
                let slot = table.keys().first().cloned().unwrap_or_default();
                let occupant = table.occupant(&slot).cloned().unwrap_or_default();
                return Err(ContainmentError::SlotOccupied {
                    container: dest_container.to_string(),
                    slot,
                    occupant,
                });
            }
        };
        self.move_object(containee, dest_container, &slot)?;
        Ok(slot)
    }

    /// Releases `containee` from its container, leaving it free.
    pub fn detach_object(&mut self, containee: &str) -> Result<(), ContainmentError> {
        let source = self.check_source_link(containee)?;
        if source.is_some() {
            self.relink(containee, source, None);
            log::debug!("detached {}", containee);
        }
        Ok(())
    }

    /// Verifies the containee's recorded source slot really holds it.
    fn check_source_link(&self, containee: &str) -> Result<Option<SlotRef>, ContainmentError> {
        let obj = self.get(containee)?;
        if !obj.kind().is_containee() {
            return Err(ContainmentError::NotAContainee(containee.to_string()));
        }
        let Some(src) = obj.placement().cloned() else {
            return Ok(None);
        };

        let holder = self.get(&src.container).map_err(|_| {
            ContainmentError::ContainmentInconsistent(format!(
                "'{}' points at unregistered container '{}'",
                containee, src.container
            ))
        })?;
        let occupant = holder.slots().and_then(|t| t.occupant(&src.slot));
        if occupant.map(String::as_str) != Some(containee) {
            return Err(ContainmentError::ContainmentInconsistent(format!(
                "'{}' claims slot '{}' of '{}', which holds {:?}",
                containee, src.slot, src.container, occupant
            )));
        }
        Ok(Some(src))
    }

    /// Applies a pre-validated link change to both sides.
    fn relink(&mut self, containee: &str, source: Option<SlotRef>, dest: Option<SlotRef>) {
        if let Some(src) = &source {
            if let Some(table) = self
                .objects
                .get_mut(&src.container)
                .and_then(|o| o.slots.as_mut())
            {
                table.detach(&src.slot);
            }
        }
        if let Some(d) = &dest {
            if let Some(table) = self
                .objects
                .get_mut(&d.container)
                .and_then(|o| o.slots.as_mut())
            {
                table.attach(&d.slot, containee);
            }
        }
        if let Some(obj) = self.objects.get_mut(containee) {
            obj.placement = dest;
        }
    }

    // ========================================================================
    // 3. ANCESTRY
    // ========================================================================

    /// Containers above `id`, innermost first.
    pub fn ancestors(&self, id: &str) -> Result<Vec<Identifier>, RegistryError> {
        let mut chain = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.contained_by() {
            if chain.iter().any(|c: &Identifier| c == parent) || parent == id {
                break;
            }
            chain.push(parent.to_string());
            current = self.get(parent)?;
        }
        Ok(chain)
    }

    /// Walks up from `containee`.
    ///
    /// Without `stop_at`, returns the immediate container, or the object
    /// itself if it is free. With `stop_at`, returns the first ancestor of
    /// that kind, or the outermost ancestor if none matches.
    pub fn get_container(
        &self,
        containee: &str,
        stop_at: Option<ObjectKind>,
    ) -> Result<&LabObject, RegistryError> {
        let chain = self.ancestors(containee)?;
        let Some(first) = chain.first() else {
            return self.get(containee);
        };
        match stop_at {
            None => self.get(first),
            Some(kind) => {
                for id in &chain {
                    let obj = self.get(id)?;
                    if obj.kind() == kind {
                        return Ok(obj);
                    }
                }
                self.get(chain.last().unwrap_or(first))
            }
        }
    }

    /// Every object transitively nested inside `container`, depth first in
    /// slot order. Acting on a container contends with all of these.
    pub fn resource_closure(&self, container: &str) -> Result<Vec<Identifier>, RegistryError> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        self.collect_containees(container, &mut out, &mut seen)?;
        Ok(out)
    }

    fn collect_containees(
        &self,
        container: &str,
        out: &mut Vec<Identifier>,
        seen: &mut BTreeSet<Identifier>,
    ) -> Result<(), RegistryError> {
        let obj = self.get(container)?;
        let Some(table) = obj.slots() else {
            return Ok(());
        };
        for child in table.contained() {
            if !seen.insert(child.clone()) {
                continue;
            }
            out.push(child.clone());
            self.collect_containees(child, out, seen)?;
        }
        Ok(())
    }
}
