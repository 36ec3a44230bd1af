// src/devices/mage.rs
//
// =============================================================================
// LABTWIN: SETUP DEVICE (v 0.3 )
// =============================================================================
//
// A bookkeeping device that materialises, fills and retires vials while the
// simulation runs, so that multi-stage benches can be expressed as a single
// instruction graph. Durations come from the `time_cost` parameter.

use super::{precondition, revalidate, DUMMY};
use crate::action::{ActionContext, ActionSpec, Params, Projection};
use crate::chemistry::ChemicalContent;
use crate::containment::SINGLE_SLOT;
use crate::core::{Identifier, LabObject, ObjectKind};
use crate::error::{ContainmentError, PostActError, PreActError, RegistryError};
use crate::lab::Lab;
use std::collections::{BTreeMap, BTreeSet};

pub static MAGE_ACTIONS: &[ActionSpec] = &[
    DUMMY,
    ActionSpec {
        name: "set_vial_chemical_content",
        summary: "overwrite the chemical content of a vial",
        proj: set_content_proj,
        pre: set_content_pre,
        post: set_content_post,
    },
    ActionSpec {
        name: "create_vials",
        summary: "register new empty vials directly into rack slots",
        proj: create_vials_proj,
        pre: create_vials_pre,
        post: create_vials_post,
    },
    ActionSpec {
        name: "annihilate_vials",
        summary: "take vials out of their racks and unregister them",
        proj: annihilate_vials_proj,
        pre: annihilate_vials_pre,
        post: annihilate_vials_post,
    },
];

fn time_cost(ctx: &ActionContext<'_>) -> Result<f64, PreActError> {
    let t = ctx.params.f64("time_cost")?;
    if !t.is_finite() || t < 0.0 {
        return Err(precondition(format!("time_cost must be non-negative, got {}", t)));
    }
    Ok(t)
}

// ============================================================================
// 1. SET CONTENT
// ============================================================================

fn set_content_plan(ctx: &ActionContext<'_>) -> Result<BTreeMap<String, f64>, PreActError> {
    time_cost(ctx)?;
    let vial = ctx.params.object("vial")?;
    ctx.lab.content_of(vial)?;
    let chemical = ctx.params.chemicals("chemical")?;
    ChemicalContent::new(chemical.clone())?;
    Ok(chemical)
}

fn set_content_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let vial = ctx.params.object("vial")?;
    Ok(Projection::new(time_cost(ctx)?).involve_closure(ctx.lab, vial)?)
}

fn set_content_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    set_content_plan(ctx).map(|_| ())
}

fn set_content_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    let chemical = revalidate(lab, device, params, set_content_plan)?;
    let vial = params.object("vial")?;
    lab.content_mut(vial)?.set_content(chemical);
    log::info!("{} set the content of {}", device, vial);
    Ok(())
}

// ============================================================================
// 2. CREATE
// ============================================================================

struct Creation {
    rack: Identifier,
    vials: Vec<(Identifier, String)>,
    vial_type: String,
}

fn create_vials_plan(ctx: &ActionContext<'_>) -> Result<Creation, PreActError> {
    time_cost(ctx)?;
    let lab = ctx.lab;
    let vials = ctx.params.objects("vials")?;
    let rack_id = ctx.params.object("in_rack")?;
    let keys = ctx.params.slot_keys("in_rack_slot_keys")?;
    ctx.params.same_length(&[("vials", vials.len()), ("in_rack_slot_keys", keys.len())])?;

    let rack = lab.get(rack_id)?;
    if rack.kind() != ObjectKind::Rack {
        return Err(RegistryError::WrongKind {
            id: rack_id.to_string(),
            found: rack.kind(),
            expected: "a rack",
        }
        .into());
    }
    let table = rack
        .slots()
        .ok_or_else(|| ContainmentError::NotAContainer(rack_id.to_string()))?;
    if !table.accepts_kind(ObjectKind::Vial) {
        return Err(ContainmentError::NotAccepted {
            container: rack_id.to_string(),
            kind: ObjectKind::Vial,
        }
        .into());
    }

    let mut ids = BTreeSet::new();
    let mut used = BTreeSet::new();
    for (vial, key) in vials.iter().zip(&keys) {
        if lab.contains(vial) || !ids.insert(*vial) {
            return Err(RegistryError::DuplicateIdentifier(vial.to_string()).into());
        }
        if !table.has_slot(key) {
            return Err(ContainmentError::UnknownSlot {
                container: rack_id.to_string(),
                slot: key.clone(),
            }
            .into());
        }
        if let Some(occupant) = table.occupant(key) {
            return Err(ContainmentError::SlotOccupied {
                container: rack_id.to_string(),
                slot: key.clone(),
                occupant: occupant.clone(),
            }
            .into());
        }
        if !used.insert(key.as_str()) {
            return Err(precondition(format!("slot '{}' is targeted twice", key)));
        }
    }

    Ok(Creation {
        rack: rack_id.to_string(),
        vials: vials
            .iter()
            .map(|v| v.to_string())
            .zip(keys.iter().cloned())
            .collect(),
        vial_type: ctx.params.opt_str("vial_type").unwrap_or("HRV").to_string(),
    })
}

/// New vials are claimed by identifier, so a failed commit removes them again.
fn create_vials_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let mut proj =
        Projection::new(time_cost(ctx)?).involve_closure(ctx.lab, ctx.params.object("in_rack")?)?;
    for vial in ctx.params.objects("vials")? {
        proj = proj.involve(vial);
    }
    Ok(proj)
}

fn create_vials_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    create_vials_plan(ctx).map(|_| ())
}

fn create_vials_post(lab: &mut Lab, device: &str, params: Params<'_>) -> Result<(), PostActError> {
    let plan = revalidate(lab, device, params, create_vials_plan)?;
    for (vial, key) in &plan.vials {
        lab.add_object(
            LabObject::new(vial.clone(), ObjectKind::Vial)
                .with_attribute("vial_type", plan.vial_type.as_str()),
        )?;
        lab.move_object(vial, &plan.rack, key)?;
    }
    log::info!(
        "{} created {} vials in {}",
        device,
        plan.vials.len(),
        plan.rack
    );
    Ok(())
}

// ============================================================================
// 3. ANNIHILATE
// ============================================================================

fn annihilate_vials_plan(ctx: &ActionContext<'_>) -> Result<Vec<Identifier>, PreActError> {
    time_cost(ctx)?;
    let lab = ctx.lab;
    let vials = ctx.params.objects("vials")?;
    let mut seen = BTreeSet::new();
    for vial in &vials {
        let obj = lab.get(vial)?;
        if obj.kind() != ObjectKind::Vial {
            return Err(RegistryError::WrongKind {
                id: vial.to_string(),
                found: obj.kind(),
                expected: "a vial",
            }
            .into());
        }
        if !seen.insert(*vial) {
            return Err(precondition(format!("vial '{}' is listed twice", vial)));
        }
        let holder = obj
            .contained_by()
            .ok_or_else(|| precondition(format!("vial '{}' is not in a rack", vial)))?;
        if lab.get(holder)?.kind() != ObjectKind::Rack {
            return Err(precondition(format!(
                "vial '{}' sits in '{}', which is not a rack",
                vial, holder
            )));
        }
        if let Some(inner) = obj.slots().and_then(|t| t.occupant(SINGLE_SLOT)) {
            return Err(RegistryError::StillContained {
                id: vial.to_string(),
                other: inner.clone(),
            }
            .into());
        }
    }
    Ok(vials.iter().map(|v| v.to_string()).collect())
}

fn annihilate_vials_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    let mut proj = Projection::new(time_cost(ctx)?);
    for vial in ctx.params.objects("vials")? {
        proj = proj.involve_closure(ctx.lab, vial)?;
        if let Some(rack) = ctx.lab.get(vial)?.contained_by() {
            proj = proj.involve(rack);
        }
    }
    Ok(proj)
}

fn annihilate_vials_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    annihilate_vials_plan(ctx).map(|_| ())
}

fn annihilate_vials_post(
    lab: &mut Lab,
    device: &str,
    params: Params<'_>,
) -> Result<(), PostActError> {
    let vials = revalidate(lab, device, params, annihilate_vials_plan)?;
    for vial in &vials {
        lab.detach_object(vial)?;
        lab.remove_object(vial)?;
    }
    log::info!("{} annihilated {} vials", device, vials.len());
    Ok(())
}
