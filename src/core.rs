// src/core.rs
//
// =============================================================================
// LABTWIN: OBJECT MODEL (v 0.3 )
// =============================================================================
//
// The physical catalogue of the benchtop.
//
// Design Principles:
// 1. Composition over hierarchy: an object carries optional role parts
//    (slot table, placement, chemical content) instead of a class tree.
// 2. Kind decides roles: the `ObjectKind` catalogue fixes which parts exist.
// 3. State is read-only from outside: fields are crate-private and only the
//    registry operations mutate them.

use crate::chemistry::ChemicalContent;
use crate::containment::{SlotRef, SlotTable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Globally unique name of a LabObject or Instruction.
pub type Identifier = String;

/// Generates a fresh identifier with a readable prefix.
pub fn new_identifier(prefix: &str) -> Identifier {
    format!("{}-{}", prefix, Uuid::new_v4())
}

// ============================================================================
// 1. THE KIND CATALOGUE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    // --- Deck positions ---
    Slot,
    WashBay,
    TipDisposal,

    // --- Motion system ---
    ArmPlatform,
    ArmZ1,
    ArmZ2,

    // --- Tools ---
    Vpg,
    Pdp,
    SvTool,

    // --- Consumables ---
    Rack,
    Vial,
    PdpTip,
    Z1Needle,
    StirBar,

    // --- Setup device (creates and annihilates vials in-simulation) ---
    Mage,
}

impl ObjectKind {
    /// Devices receive instructions.
    pub fn is_device(self) -> bool {
        matches!(
            self,
            ObjectKind::Slot
                | ObjectKind::ArmPlatform
                | ObjectKind::ArmZ1
                | ObjectKind::ArmZ2
                | ObjectKind::Mage
        )
    }

    pub fn is_container(self) -> bool {
        matches!(
            self,
            ObjectKind::Slot
                | ObjectKind::ArmPlatform
                | ObjectKind::ArmZ1
                | ObjectKind::ArmZ2
                | ObjectKind::Vpg
                | ObjectKind::Pdp
                | ObjectKind::SvTool
                | ObjectKind::Rack
                | ObjectKind::Vial
        )
    }

    pub fn is_containee(self) -> bool {
        matches!(
            self,
            ObjectKind::ArmZ1
                | ObjectKind::ArmZ2
                | ObjectKind::Vpg
                | ObjectKind::Pdp
                | ObjectKind::SvTool
                | ObjectKind::Rack
                | ObjectKind::Vial
                | ObjectKind::PdpTip
                | ObjectKind::Z1Needle
                | ObjectKind::StirBar
        )
    }

    pub fn is_chemical_container(self) -> bool {
        matches!(
            self,
            ObjectKind::Vial | ObjectKind::PdpTip | ObjectKind::Z1Needle
        )
    }

    /// Fixed places on the deck an arm can be positioned over.
    pub fn is_deck_position(self) -> bool {
        matches!(
            self,
            ObjectKind::Slot | ObjectKind::WashBay | ObjectKind::TipDisposal
        )
    }

    /// Default slot layout of a container kind, `None` for non-containers.
    pub fn default_slots(self) -> Option<SlotTable> {
        use ObjectKind::*;
        let table = match self {
            Slot => SlotTable::single(vec![Rack, Vial, Vpg, Pdp, SvTool]),
            ArmPlatform => SlotTable::named(&["z1", "z2"], vec![ArmZ1, ArmZ2]),
            ArmZ1 => SlotTable::numbered(7, vec![Z1Needle]),
            ArmZ2 => SlotTable::single(vec![Vpg, Pdp, SvTool]),
            Vpg => SlotTable::single(vec![Rack]),
            Pdp => SlotTable::single(vec![PdpTip]),
            SvTool => SlotTable::single(vec![Vial]),
            Rack => SlotTable::numbered(4, vec![Vial, PdpTip]),
            Vial => SlotTable::single(vec![StirBar]),
            _ => return None,
        };
        Some(table)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&s)
    }
}

// ============================================================================
// 2. LAYOUT (excluded from state)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

fn default_width() -> f64 {
    80.0
}
fn default_height() -> f64 {
    120.0
}

// ============================================================================
// 3. THE LAB OBJECT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct LabObject {
    pub(crate) id: Identifier,
    pub(crate) kind: ObjectKind,
    pub(crate) slots: Option<SlotTable>,
    /// Weak back-reference to the holding container. Only meaningful for
    /// containee kinds; `None` means the object is free.
    pub(crate) placement: Option<SlotRef>,
    pub(crate) content: Option<ChemicalContent>,
    pub(crate) attributes: BTreeMap<String, Value>,
    pub(crate) layout: Option<Layout>,
}

impl LabObject {
    pub fn new(id: impl Into<Identifier>, kind: ObjectKind) -> Self {
        Self {
            id: id.into(),
            kind,
            slots: kind.default_slots(),
            placement: None,
            content: kind
                .is_chemical_container()
                .then(ChemicalContent::default),
            attributes: BTreeMap::new(),
            layout: None,
        }
    }

    /// An object with a generated identifier.
    pub fn anonymous(kind: ObjectKind) -> Self {
        Self::new(new_identifier(&kind.to_string()), kind)
    }

    // --- Builders (construction time only) ---

    /// Numbered slots `1..=capacity`. Capacity is immutable afterwards.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        if let Some(table) = self.slots.take() {
            self.slots = Some(SlotTable::numbered(capacity, table.accepts().to_vec()));
        }
        self
    }

    pub fn with_slot_keys(mut self, keys: &[&str]) -> Self {
        if let Some(table) = self.slots.take() {
            self.slots = Some(SlotTable::named(keys, table.accepts().to_vec()));
        }
        self
    }

    pub fn with_accepts(mut self, kinds: Vec<ObjectKind>) -> Self {
        if let Some(table) = self.slots.as_mut() {
            table.set_accepts(kinds);
        }
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Initial content. Ignored for kinds that do not hold chemicals.
    pub fn with_content(mut self, content: &BTreeMap<String, f64>) -> Self {
        if let Some(c) = self.content.as_mut() {
            c.set_content(content.clone());
        }
        self
    }

    // --- Accessors ---

    pub fn identifier(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn is_device(&self) -> bool {
        self.kind.is_device()
    }

    pub fn slots(&self) -> Option<&SlotTable> {
        self.slots.as_ref()
    }

    pub fn placement(&self) -> Option<&SlotRef> {
        self.placement.as_ref()
    }

    pub fn contained_by(&self) -> Option<&str> {
        self.placement.as_ref().map(|p| p.container.as_str())
    }

    pub fn contained_in_slot(&self) -> Option<&str> {
        self.placement.as_ref().map(|p| p.slot.as_str())
    }

    pub fn content(&self) -> Option<&ChemicalContent> {
        self.content.as_ref()
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub(crate) fn set_attribute(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Every attribute except the visual/spatial layout.
    pub fn state(&self) -> Value {
        let mut d = Map::new();
        d.insert("identifier".into(), Value::String(self.id.clone()));
        d.insert("kind".into(), Value::String(self.kind.to_string()));

        if let Some(table) = &self.slots {
            let slots: Map<String, Value> = table
                .slot_content()
                .into_iter()
                .map(|(k, v)| (k, v.map(Value::String).unwrap_or(Value::Null)))
                .collect();
            d.insert("slot_content".into(), Value::Object(slots));
        }

        if self.kind.is_containee() {
            d.insert(
                "contained_by".into(),
                self.contained_by()
                    .map(|s| Value::String(s.to_string()))
                    .unwrap_or(Value::Null),
            );
            d.insert(
                "contained_in_slot".into(),
                self.contained_in_slot()
                    .map(|s| Value::String(s.to_string()))
                    .unwrap_or(Value::Null),
            );
        }

        if let Some(c) = &self.content {
            let chems: Map<String, Value> = c
                .chemical_content()
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(*v)))
                .collect();
            d.insert("chemical_content".into(), Value::Object(chems));
        }

        for (k, v) in &self.attributes {
            d.insert(k.clone(), v.clone());
        }

        Value::Object(d)
    }
}
