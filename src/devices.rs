// src/devices.rs
//
// =============================================================================
// LABTWIN: DEVICE CATALOGUE & ACTION TABLES (v 0.3 )
// =============================================================================
//
// The concrete actions behind the protocol in `action.rs`.
//
// Responsibilities:
// 1. Map each device kind to its static table of actions.
// 2. Hold the duration constants used by projections (`ActionTimings`).
// 3. Provide positioning helpers shared by the arm actions.

use crate::action::{ActionContext, ActionSpec, Params, Projection};
use crate::chemistry::ChemicalContent;
use crate::core::{Identifier, LabObject, ObjectKind};
use crate::error::{PostActError, PreActError};
use crate::lab::Lab;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

// Declare the concrete implementations
pub mod arms;
pub mod mage;
pub mod stations;

/// Platform attribute: the deck position the platform is over.
pub const POSITION_ATTR: &str = "position_on_top_of";
/// Platform attribute: which arm slot ("z1"/"z2") is aligned with it.
pub const ANCHOR_ATTR: &str = "anchor_arm";

// ============================================================================
// 1. TIMINGS
// ============================================================================

/// Projected-duration constants (simulated seconds, volumes in mL, masses in g).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionTimings {
    pub arm_move: f64,
    pub pick_up: f64,
    pub put_down: f64,
    pub aspirate_base: f64,
    pub dispense_base: f64,
    /// Volume per second through a Z1 needle.
    pub needle_flow_rate: f64,
    /// Volume per second through a PDP tip.
    pub pdp_flow_rate: f64,
    /// Mass per second out of the SV tool.
    pub sv_dispense_rate: f64,
    pub wash: f64,
}

impl Default for ActionTimings {
    fn default() -> Self {
        Self {
            arm_move: 5.0,
            pick_up: 4.0,
            put_down: 4.0,
            aspirate_base: 5.0,
            dispense_base: 5.0,
            needle_flow_rate: 5.0,
            pdp_flow_rate: 2.0,
            sv_dispense_rate: 0.5,
            wash: 30.0,
        }
    }
}

impl ActionTimings {
    /// Base time plus amount over rate. A non-positive rate adds nothing.
    pub fn flow(base: f64, amount: f64, rate: f64) -> f64 {
        if rate > 0.0 {
            base + amount / rate
        } else {
            base
        }
    }
}

// ============================================================================
// 2. DISPATCH TABLE
// ============================================================================

/// The static action table of a kind. Non-devices have none.
pub fn actions_for(kind: ObjectKind) -> &'static [ActionSpec] {
    match kind {
        ObjectKind::Slot => stations::SLOT_ACTIONS,
        ObjectKind::ArmPlatform => arms::PLATFORM_ACTIONS,
        ObjectKind::ArmZ1 => arms::Z1_ACTIONS,
        ObjectKind::ArmZ2 => arms::Z2_ACTIONS,
        ObjectKind::Mage => mage::MAGE_ACTIONS,
        _ => &[],
    }
}

/// Every device answers to `dummy`: nothing involved, no time, no effect.
pub(crate) const DUMMY: ActionSpec = ActionSpec {
    name: "dummy",
    summary: "no-op placeholder",
    proj: dummy_proj,
    pre: dummy_pre,
    post: dummy_post,
};

fn dummy_proj(_: &ActionContext<'_>) -> Result<Projection, PreActError> {
    Ok(Projection::new(0.0))
}

fn dummy_pre(_: &ActionContext<'_>) -> Result<(), PreActError> {
    Ok(())
}

fn dummy_post(_: &mut Lab, _: &str, _: Params<'_>) -> Result<(), PostActError> {
    Ok(())
}

// ============================================================================
// 3. SHARED HELPERS
// ============================================================================

pub(crate) fn precondition(msg: impl Into<String>) -> PreActError {
    PreActError::Precondition(msg.into())
}

/// A pre-phase check that no longer holds at commit time.
pub(crate) fn illegal(e: PreActError) -> PostActError {
    PostActError::IllegalTransition(e.to_string())
}

/// Re-runs a read-only plan at commit time, against the current state.
pub(crate) fn revalidate<T>(
    lab: &Lab,
    device: &str,
    params: Params<'_>,
    plan: impl FnOnce(&ActionContext<'_>) -> Result<T, PreActError>,
) -> Result<T, PostActError> {
    let actor = lab.get(device)?;
    let ctx = ActionContext { lab, actor, params };
    plan(&ctx).map_err(illegal)
}

/// The deck position that holds `id`, or `id` itself if it is one.
pub(crate) fn station_of<'a>(lab: &'a Lab, id: &str) -> Result<&'a LabObject, PreActError> {
    let obj = lab.get(id)?;
    if obj.kind().is_deck_position() {
        return Ok(obj);
    }
    let top = lab.get_container(id, Some(ObjectKind::Slot))?;
    if top.kind().is_deck_position() {
        Ok(top)
    } else {
        Err(precondition(format!("'{}' is not on any deck position", id)))
    }
}

/// The platform an arm is mounted on.
pub(crate) fn platform_of<'a>(
    lab: &'a Lab,
    arm: &LabObject,
) -> Result<&'a LabObject, PreActError> {
    let parent = arm
        .contained_by()
        .ok_or_else(|| precondition(format!("arm '{}' is not mounted", arm.identifier())))?;
    let platform = lab.get(parent)?;
    if platform.kind() != ObjectKind::ArmPlatform {
        return Err(precondition(format!(
            "arm '{}' is mounted on '{}', which is not an arm platform",
            arm.identifier(),
            parent
        )));
    }
    Ok(platform)
}

/// Fails unless `arm`'s platform is over `station` and anchored on `arm`.
pub(crate) fn require_over(lab: &Lab, arm: &LabObject, station: &str) -> Result<(), PreActError> {
    let platform = platform_of(lab, arm)?;
    let over = platform.attribute_str(POSITION_ATTR);
    let anchor = platform.attribute_str(ANCHOR_ATTR);
    if over != Some(station) || anchor != arm.contained_in_slot() {
        return Err(precondition(format!(
            "arm '{}' is not positioned over '{}' (platform over {:?}, anchored at {:?})",
            arm.identifier(),
            station,
            over,
            anchor
        )));
    }
    Ok(())
}

/// The sole occupant of a single-slot container, if any.
pub(crate) fn held<'a>(lab: &'a Lab, holder: &LabObject) -> Result<Option<&'a LabObject>, PreActError> {
    let Some(table) = holder.slots() else {
        return Ok(None);
    };
    match table.contained().next() {
        Some(id) => Ok(Some(lab.get(id)?)),
        None => Ok(None),
    }
}

/// Dry-run withdrawals against copies of the current content. Repeated draws
/// from one container are checked against what the earlier ones left.
pub(crate) struct DrawLedger<'a> {
    lab: &'a Lab,
    remaining: BTreeMap<Identifier, ChemicalContent>,
}

impl<'a> DrawLedger<'a> {
    pub(crate) fn new(lab: &'a Lab) -> Self {
        Self {
            lab,
            remaining: BTreeMap::new(),
        }
    }

    pub(crate) fn draw(&mut self, id: &str, amount: f64) -> Result<(), PreActError> {
        let left = match self.remaining.entry(id.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(self.lab.content_of(id)?.clone()),
        };
        left.remove_content(amount)?;
        Ok(())
    }
}

/// Checks that `amount` could be withdrawn from `id` without mutating it.
pub(crate) fn check_withdrawable(lab: &Lab, id: &str, amount: f64) -> Result<(), PreActError> {
    DrawLedger::new(lab).draw(id, amount)
}

/// Locks the arm's payload and, when mounted, its platform.
pub(crate) fn arm_projection(
    ctx: &ActionContext<'_>,
    duration: f64,
) -> Result<Projection, PreActError> {
    let mut proj = Projection::new(duration).involve_contents(ctx.lab, ctx.actor.identifier())?;
    if let Some(platform) = ctx.actor.contained_by() {
        proj = proj.involve(platform);
    }
    Ok(proj)
}
