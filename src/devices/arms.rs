// src/devices/arms.rs
//
// =============================================================================
// LABTWIN: MOTION SYSTEM (v 0.3 )
// =============================================================================
//
// The gantry and its two heads.
//
// Hardware model:
// - ArmPlatform: moves over a deck position, aligning one head ("z1"/"z2").
// - ArmZ2: holds one tool (VPG, PDP or SV tool); the tool holds the payload.
// - ArmZ1: a row of needles that aspirate/dispense in parallel.
//
// Every head action requires the platform to sit over the deck position that
// (transitively) holds its target, anchored on that head.

use super::{
    arm_projection, check_withdrawable, held, precondition, require_over, revalidate, station_of,
    ActionTimings, DrawLedger, ANCHOR_ATTR, DUMMY, POSITION_ATTR,
};
use crate::action::{ActionContext, ActionSpec, Params, Projection};
use crate::core::{Identifier, LabObject, ObjectKind};
use crate::error::{ContainmentError, PostActError, PreActError, RegistryError};
use crate::lab::Lab;
use serde_json::Value;
use std::collections::BTreeSet;

/// Tip-disposal attribute listing the tips dropped into it.
pub const DISPOSAL_ATTR: &str = "disposal_content";

// ============================================================================
// 1. TABLES
// ============================================================================

pub static PLATFORM_ACTIONS: &[ActionSpec] = &[
    DUMMY,
    ActionSpec {
        name: "move_to",
        summary: "position the platform over a deck slot, aligned on one arm",
        proj: move_to_proj,
        pre: move_to_pre,
        post: move_to_post,
    },
];

pub static Z2_ACTIONS: &[ActionSpec] = &[
    DUMMY,
    ActionSpec {
        name: "pick_up",
        summary: "grab a tool, or grab a payload with the held tool",
        proj: pick_up_proj,
        pre: pick_up_pre,
        post: pick_up_post,
    },
    ActionSpec {
        name: "put_down",
        summary: "release the payload (or the bare tool) into a container",
        proj: put_down_proj,
        pre: put_down_pre,
        post: put_down_post,
    },
    ActionSpec {
        name: "aspirate_pdp",
        summary: "draw liquid into the PDP tip",
        proj: aspirate_pdp_proj,
        pre: aspirate_pdp_pre,
        post: aspirate_pdp_post,
    },
    ActionSpec {
        name: "dispense_pdp",
        summary: "push liquid out of the PDP tip",
        proj: dispense_pdp_proj,
        pre: dispense_pdp_pre,
        post: dispense_pdp_post,
    },
    ActionSpec {
        name: "dispense_sv",
        summary: "dose powder from the vial held by the SV tool",
        proj: dispense_sv_proj,
        pre: dispense_sv_pre,
        post: dispense_sv_post,
    },
];

pub static Z1_ACTIONS: &[ActionSpec] = &[
    DUMMY,
    ActionSpec {
        name: "concurrent_aspirate",
        summary: "draw liquid into several needles at once",
        proj: concurrent_aspirate_proj,
        pre: concurrent_aspirate_pre,
        post: concurrent_aspirate_post,
    },
    ActionSpec {
        name: "concurrent_dispense",
        summary: "push liquid out of several needles at once",
        proj: concurrent_dispense_proj,
        pre: concurrent_dispense_pre,
        post: concurrent_dispense_post,
    },
    ActionSpec {
        name: "wash",
        summary: "empty every needle at the wash bay",
        proj: wash_proj,
        pre: wash_pre,
        post: wash_post,
    },
];

// ============================================================================
// 2. PLATFORM
// ============================================================================

fn move_to_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let dest = ctx.params.object("move_to_slot")?;
    let proj = Projection::new(ctx.lab.timings().arm_move)
        .involve_contents(ctx.lab, ctx.actor.identifier())?
        .involve_closure(ctx.lab, dest)?;
    Ok(proj)
}

fn move_to_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    let anchor = ctx.params.object("anchor_arm")?;
    let dest = ctx.lab.get(ctx.params.object("move_to_slot")?)?;
    if !dest.kind().is_deck_position() {
        return Err(RegistryError::WrongKind {
            id: dest.identifier().to_string(),
            found: dest.kind(),
            expected: "a deck position",
        }
        .into());
    }
    let table = ctx
        .actor
        .slots()
        .ok_or_else(|| ContainmentError::NotAContainer(ctx.actor.identifier().to_string()))?;
    if !table.has_slot(anchor) {
        return Err(ContainmentError::UnknownSlot {
            container: ctx.actor.identifier().to_string(),
            slot: anchor.to_string(),
        }
        .into());
    }
    if table.occupant(anchor).is_none() {
        return Err(precondition(format!(
            "no arm is mounted at '{}' of '{}'",
            anchor,
            ctx.actor.identifier()
        )));
    }
    Ok(())
}

fn move_to_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    revalidate(lab, device, params, move_to_pre)?;
    let anchor = params.object("anchor_arm")?;
    let dest = params.object("move_to_slot")?;
    let platform = lab.get_mut(device)?;
    platform.set_attribute(POSITION_ATTR, dest);
    platform.set_attribute(ANCHOR_ATTR, anchor);
    log::info!("{} over {} anchored at {}", device, dest, anchor);
    Ok(())
}

// ============================================================================
// 3. Z2: TOOLS & PAYLOADS
// ============================================================================

/// Where `thing` would end up: the bare arm, or the tool the arm holds.
fn pick_up_plan(ctx: &ActionContext<'_>) -> Result<Identifier, PreActError> {
    let (lab, arm) = (ctx.lab, ctx.actor);
    let thing_id = ctx.params.object("thing")?;
    let thing = lab.get(thing_id)?;
    if !thing.kind().is_containee() {
        return Err(ContainmentError::NotAContainee(thing_id.to_string()).into());
    }
    if lab.ancestors(thing_id)?.iter().any(|a| a == arm.identifier()) {
        return Err(precondition(format!(
            "'{}' is already held by '{}'",
            thing_id,
            arm.identifier()
        )));
    }
    if thing.contained_by().is_none() {
        return Err(precondition(format!("'{}' is not on the deck", thing_id)));
    }
    let station = station_of(lab, thing_id)?;
    require_over(lab, arm, station.identifier())?;

    let table = arm
        .slots()
        .ok_or_else(|| ContainmentError::NotAContainer(arm.identifier().to_string()))?;
    if table.is_empty() {
        if table.accepts_kind(thing.kind()) {
            return Ok(arm.identifier().to_string());
        }
        return Err(precondition(format!(
            "'{}' cannot grab a {} without a tool",
            arm.identifier(),
            thing.kind()
        )));
    }

    let tool = held(lab, arm)?
        .ok_or_else(|| precondition(format!("'{}' reports a tool it does not hold", arm.identifier())))?;
    let free = tool
        .slots()
        .map(|t| t.is_empty() && t.accepts_kind(thing.kind()))
        .unwrap_or(false);
    if !free {
        return Err(precondition(format!(
            "tool '{}' on '{}' cannot take '{}'",
            tool.identifier(),
            arm.identifier(),
            thing_id
        )));
    }
    Ok(tool.identifier().to_string())
}

fn pick_up_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let thing = ctx.params.object("thing")?;
    let mut proj = arm_projection(ctx, ctx.lab.timings().pick_up)?.involve_closure(ctx.lab, thing)?;
    if let Some(source) = ctx.lab.get(thing)?.contained_by() {
        proj = proj.involve(source);
    }
    Ok(proj)
}

fn pick_up_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    pick_up_plan(ctx).map(|_| ())
}

fn pick_up_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    let holder = revalidate(lab, device, params, pick_up_plan)?;
    let thing = params.object("thing")?;
    lab.move_to_first_empty(thing, &holder)?;
    log::info!("{} picked up {} into {}", device, thing, holder);
    Ok(())
}

/// The object a put-down releases: the tool's payload, or the tool itself.
fn payload<'a>(lab: &'a Lab, arm: &LabObject) -> Result<&'a LabObject, PreActError> {
    let tool = held(lab, arm)?
        .ok_or_else(|| precondition(format!("'{}' holds nothing", arm.identifier())))?;
    Ok(held(lab, tool)?.unwrap_or(tool))
}

enum Release {
    Dispose { payload: Identifier },
    Place {
        payload: Identifier,
        container: Identifier,
        slot: String,
    },
}

fn put_down_plan(ctx: &ActionContext<'_>) -> Result<Release, PreActError> {
    let (lab, arm) = (ctx.lab, ctx.actor);
    let dest_id = ctx.params.object("dest_slot")?;
    let payload = payload(lab, arm)?;
    let dest = lab.get(dest_id)?;
    let station = station_of(lab, dest_id)?;
    require_over(lab, arm, station.identifier())?;

    if dest.kind() == ObjectKind::TipDisposal {
        if payload.kind() != ObjectKind::PdpTip {
            return Err(precondition(format!(
                "only PDP tips go into '{}', '{}' is a {}",
                dest_id,
                payload.identifier(),
                payload.kind()
            )));
        }
        return Ok(Release::Dispose {
            payload: payload.identifier().to_string(),
        });
    }

    let table = dest
        .slots()
        .ok_or_else(|| ContainmentError::NotAContainer(dest_id.to_string()))?;
    if !table.accepts_kind(payload.kind()) {
        return Err(ContainmentError::NotAccepted {
            container: dest_id.to_string(),
            kind: payload.kind(),
        }
        .into());
    }
    let slot = match ctx.params.opt_str("dest_slot_key") {
        Some(key) => {
            if !table.has_slot(key) {
                return Err(ContainmentError::UnknownSlot {
                    container: dest_id.to_string(),
                    slot: key.to_string(),
                }
                .into());
            }
            if let Some(occupant) = table.occupant(key) {
                return Err(ContainmentError::SlotOccupied {
                    container: dest_id.to_string(),
                    slot: key.to_string(),
                    occupant: occupant.clone(),
                }
                .into());
            }
            key.to_string()
        }
        None => table
            .empty_slot_keys()
            .into_iter()
            .next()
            .ok_or_else(|| precondition(format!("'{}' has no empty slot", dest_id)))?,
    };
    Ok(Release::Place {
        payload: payload.identifier().to_string(),
        container: dest_id.to_string(),
        slot,
    })
}

fn put_down_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let dest = ctx.params.object("dest_slot")?;
    Ok(arm_projection(ctx, ctx.lab.timings().put_down)?.involve_closure(ctx.lab, dest)?)
}

fn put_down_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    put_down_plan(ctx).map(|_| ())
}

fn put_down_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    match revalidate(lab, device, params, put_down_plan)? {
        Release::Dispose { payload } => {
            let disposal = params.object("dest_slot")?;
            lab.detach_object(&payload)?;
            let bin = lab.get_mut(disposal)?;
            let mut dropped = match bin.attribute(DISPOSAL_ATTR) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            dropped.push(Value::String(payload.clone()));
            bin.set_attribute(DISPOSAL_ATTR, Value::Array(dropped));
            log::info!("{} disposed of {} in {}", device, payload, disposal);
        }
        Release::Place {
            payload,
            container,
            slot,
        } => {
            lab.move_object(&payload, &container, &slot)?;
            log::info!("{} put {} down in {}[{}]", device, payload, container, slot);
        }
    }
    Ok(())
}

// --- Liquid and powder handling ---

/// A single-head transfer, resolved to concrete identifiers.
struct Transfer {
    from: Identifier,
    to: Identifier,
    amount: f64,
}

/// The tip on the PDP held by `arm`.
fn pdp_tip<'a>(lab: &'a Lab, arm: &LabObject) -> Result<&'a LabObject, PreActError> {
    let pdp = held(lab, arm)?
        .filter(|t| t.kind() == ObjectKind::Pdp)
        .ok_or_else(|| precondition(format!("'{}' does not hold a PDP", arm.identifier())))?;
    held(lab, pdp)?.ok_or_else(|| precondition(format!("PDP '{}' has no tip", pdp.identifier())))
}

/// The vial in the SV tool held by `arm`.
fn sv_vial<'a>(lab: &'a Lab, arm: &LabObject) -> Result<&'a LabObject, PreActError> {
    let svt = held(lab, arm)?
        .filter(|t| t.kind() == ObjectKind::SvTool)
        .ok_or_else(|| precondition(format!("'{}' does not hold an SV tool", arm.identifier())))?;
    held(lab, svt)?
        .ok_or_else(|| precondition(format!("SV tool '{}' holds no vial", svt.identifier())))
}

/// Resolves a head-to-container transfer and checks it against the world.
/// `outward` means from the head into `container_key`.
fn head_transfer(
    ctx: &ActionContext<'_>,
    head: fn(&Lab, &LabObject) -> Result<Identifier, PreActError>,
    container_key: &str,
    outward: bool,
) -> Result<Transfer, PreActError> {
    let amount = ctx.params.f64("amount")?;
    let container = ctx.params.object(container_key)?;
    let head = head(ctx.lab, ctx.actor)?;
    ctx.lab.content_of(container)?;
    let station = station_of(ctx.lab, container)?;
    require_over(ctx.lab, ctx.actor, station.identifier())?;

    let (from, to) = if outward {
        (head, container.to_string())
    } else {
        (container.to_string(), head)
    };
    check_withdrawable(ctx.lab, &from, amount)?;
    Ok(Transfer { from, to, amount })
}

fn tip_id(lab: &Lab, arm: &LabObject) -> Result<Identifier, PreActError> {
    pdp_tip(lab, arm).map(|t| t.identifier().to_string())
}

fn sv_vial_id(lab: &Lab, arm: &LabObject) -> Result<Identifier, PreActError> {
    sv_vial(lab, arm).map(|v| v.identifier().to_string())
}

fn aspirate_pdp_plan(ctx: &ActionContext<'_>) -> Result<Transfer, PreActError> {
    head_transfer(ctx, tip_id, "source_container", false)
}

fn dispense_pdp_plan(ctx: &ActionContext<'_>) -> Result<Transfer, PreActError> {
    head_transfer(ctx, tip_id, "destination_container", true)
}

fn dispense_sv_plan(ctx: &ActionContext<'_>) -> Result<Transfer, PreActError> {
    head_transfer(ctx, sv_vial_id, "destination_container", true)
}

fn apply_transfers(lab: &mut Lab, device: &str, transfers: &[Transfer]) -> Result<(), PostActError> {
    for t in transfers {
        lab.transfer_content(&t.from, &t.to, t.amount)?;
        log::info!("{} moved {:.3} from {} to {}", device, t.amount, t.from, t.to);
    }
    Ok(())
}

fn aspirate_pdp_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let t = ctx.lab.timings();
    let amount = ctx.params.f64("amount")?;
    let source = ctx.params.object("source_container")?;
    let duration = ActionTimings::flow(t.aspirate_base, amount, t.pdp_flow_rate);
    Ok(arm_projection(ctx, duration)?.involve_closure(ctx.lab, source)?)
}

fn aspirate_pdp_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    aspirate_pdp_plan(ctx).map(|_| ())
}

fn aspirate_pdp_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    let transfer = revalidate(lab, device, params, aspirate_pdp_plan)?;
    apply_transfers(lab, device, &[transfer])
}

fn dispense_pdp_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let t = ctx.lab.timings();
    let amount = ctx.params.f64("amount")?;
    let dest = ctx.params.object("destination_container")?;
    let duration = ActionTimings::flow(t.dispense_base, amount, t.pdp_flow_rate);
    Ok(arm_projection(ctx, duration)?.involve_closure(ctx.lab, dest)?)
}

fn dispense_pdp_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    dispense_pdp_plan(ctx).map(|_| ())
}

fn dispense_pdp_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    let transfer = revalidate(lab, device, params, dispense_pdp_plan)?;
    apply_transfers(lab, device, &[transfer])
}

fn dispense_sv_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let t = ctx.lab.timings();
    let amount = ctx.params.f64("amount")?;
    let dest = ctx.params.object("destination_container")?;
    let duration = ActionTimings::flow(t.dispense_base, amount, t.sv_dispense_rate);
    Ok(arm_projection(ctx, duration)?.involve_closure(ctx.lab, dest)?)
}

fn dispense_sv_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    dispense_sv_plan(ctx).map(|_| ())
}

fn dispense_sv_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    let transfer = revalidate(lab, device, params, dispense_sv_plan)?;
    apply_transfers(lab, device, &[transfer])
}

// ============================================================================
// 4. Z1: NEEDLE BANK
// ============================================================================

/// Resolves a parallel needle transfer. All containers must share one deck
/// position, each needle may appear once, and draws that share a source
/// must fit in it together.
fn needle_plan(ctx: &ActionContext<'_>, aspirate: bool) -> Result<Vec<Transfer>, PreActError> {
    let (lab, arm) = (ctx.lab, ctx.actor);
    let key = if aspirate {
        "source_containers"
    } else {
        "destination_containers"
    };
    let containers = ctx.params.objects(key)?;
    let needles = ctx.params.objects("dispenser_containers")?;
    let amounts = ctx.params.f64s("amounts")?;
    ctx.params.same_length(&[
        (key, containers.len()),
        ("dispenser_containers", needles.len()),
        ("amounts", amounts.len()),
    ])?;
    if needles.is_empty() {
        return Err(precondition("no needles given"));
    }

    let mut seen = BTreeSet::new();
    let mut stations = BTreeSet::new();
    let mut ledger = DrawLedger::new(lab);
    let mut transfers = Vec::with_capacity(needles.len());
    for ((container, needle), amount) in containers.iter().zip(&needles).zip(&amounts) {
        let n = lab.get(needle)?;
        if n.kind() != ObjectKind::Z1Needle || n.contained_by() != Some(arm.identifier()) {
            return Err(precondition(format!(
                "'{}' is not a needle mounted on '{}'",
                needle,
                arm.identifier()
            )));
        }
        if !seen.insert(*needle) {
            return Err(precondition(format!("needle '{}' is listed twice", needle)));
        }
        lab.content_of(container)?;
        stations.insert(station_of(lab, container)?.identifier().to_string());

        let (from, to) = if aspirate {
            (container.to_string(), needle.to_string())
        } else {
            (needle.to_string(), container.to_string())
        };
        ledger.draw(&from, *amount)?;
        transfers.push(Transfer {
            from,
            to,
            amount: *amount,
        });
    }

    if stations.len() != 1 {
        return Err(precondition(format!(
            "containers span several deck positions: {:?}",
            stations
        )));
    }
    if let Some(station) = stations.first() {
        require_over(lab, arm, station)?;
    }
    Ok(transfers)
}

fn needle_proj(ctx: &ActionContext<'_>, aspirate: bool) -> Result<Projection, PreActError> {
    let t = ctx.lab.timings();
    let (key, base) = if aspirate {
        ("source_containers", t.aspirate_base)
    } else {
        ("destination_containers", t.dispense_base)
    };
    let largest = ctx
        .params
        .f64s("amounts")?
        .into_iter()
        .fold(0.0_f64, f64::max);
    let mut proj = arm_projection(ctx, ActionTimings::flow(base, largest, t.needle_flow_rate))?;
    for container in ctx.params.objects(key)? {
        proj = proj.involve_closure(ctx.lab, container)?;
    }
    Ok(proj)
}

fn concurrent_aspirate_plan(ctx: &ActionContext<'_>) -> Result<Vec<Transfer>, PreActError> {
    needle_plan(ctx, true)
}

fn concurrent_dispense_plan(ctx: &ActionContext<'_>) -> Result<Vec<Transfer>, PreActError> {
    needle_plan(ctx, false)
}

fn concurrent_aspirate_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    needle_proj(ctx, true)
}

fn concurrent_aspirate_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    concurrent_aspirate_plan(ctx).map(|_| ())
}

fn concurrent_aspirate_post(
    lab: &mut Lab,
    device: &str,
    params: Params<'_>,
) -> Result<(), PostActError> {
    let transfers = revalidate(lab, device, params, concurrent_aspirate_plan)?;
    apply_transfers(lab, device, &transfers)
}

fn concurrent_dispense_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    needle_proj(ctx, false)
}

fn concurrent_dispense_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    concurrent_dispense_plan(ctx).map(|_| ())
}

fn concurrent_dispense_post(
    lab: &mut Lab,
    device: &str,
    params: Params<'_>,
) -> Result<(), PostActError> {
    let transfers = revalidate(lab, device, params, concurrent_dispense_plan)?;
    apply_transfers(lab, device, &transfers)
}

fn wash_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let bay = ctx.params.object("wash_bay")?;
    Ok(arm_projection(ctx, ctx.lab.timings().wash)?.involve_closure(ctx.lab, bay)?)
}

fn wash_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    let bay = ctx.lab.get(ctx.params.object("wash_bay")?)?;
    if bay.kind() != ObjectKind::WashBay {
        return Err(RegistryError::WrongKind {
            id: bay.identifier().to_string(),
            found: bay.kind(),
            expected: "a wash bay",
        }
        .into());
    }
    require_over(ctx.lab, ctx.actor, bay.identifier())
}

fn wash_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    revalidate(lab, device, params, wash_pre)?;
    let needles: Vec<Identifier> = lab
        .get(device)?
        .slots()
        .map(|t| t.contained().cloned().collect())
        .unwrap_or_default();
    for needle in &needles {
        lab.content_mut(needle)?.clear();
    }
    log::info!("{} washed {} needles", device, needles.len());
    Ok(())
}
