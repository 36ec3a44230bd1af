// src/setup/racks.rs
//
// Rack factories: a rack plus `n` containees in slots "1".."n", with ids
// derived from the rack id.

use crate::core::{Identifier, LabObject, ObjectKind};
use crate::error::{ContainmentError, LabError};
use crate::lab::Lab;

/// Registers a rack holding `n_vials` empty vials named `<rack_id>/vial-<k>`.
pub fn rack_with_vials(
    lab: &mut Lab,
    rack_id: &str,
    capacity: usize,
    n_vials: usize,
    vial_type: &str,
) -> Result<Vec<Identifier>, LabError> {
    fill_rack(lab, rack_id, capacity, n_vials, ObjectKind::Vial, |k| {
        LabObject::new(format!("{}/vial-{}", rack_id, k), ObjectKind::Vial)
            .with_attribute("vial_type", vial_type)
    })
}

/// Registers a rack holding `n_tips` empty PDP tips named `<rack_id>/PdpTip-<k>`.
pub fn rack_with_tips(
    lab: &mut Lab,
    rack_id: &str,
    capacity: usize,
    n_tips: usize,
) -> Result<Vec<Identifier>, LabError> {
    fill_rack(lab, rack_id, capacity, n_tips, ObjectKind::PdpTip, |k| {
        LabObject::new(format!("{}/PdpTip-{}", rack_id, k), ObjectKind::PdpTip)
            .with_attribute("material", "PLASTIC")
    })
}

fn fill_rack(
    lab: &mut Lab,
    rack_id: &str,
    capacity: usize,
    n: usize,
    kind: ObjectKind,
    make: impl Fn(usize) -> LabObject,
) -> Result<Vec<Identifier>, LabError> {
    let rack = LabObject::new(rack_id, ObjectKind::Rack)
        .with_capacity(capacity)
        .with_accepts(vec![kind]);
    let slots: Vec<String> = rack
        .slots()
        .map(|t| t.keys().to_vec())
        .unwrap_or_default();
    if n > slots.len() {
        return Err(ContainmentError::UnknownSlot {
            container: rack_id.to_string(),
            slot: n.to_string(),
        }
        .into());
    }
    lab.add_object(rack)?;

    let mut ids = Vec::with_capacity(n);
    for (k, slot) in slots.iter().take(n).enumerate() {
        let item = make(k + 1);
        let id = item.identifier().to_string();
        lab.add_object(item)?;
        lab.move_object(&id, rack_id, slot)?;
        ids.push(id);
    }
    log::debug!("rack {} filled with {} x {}", rack_id, n, kind);
    Ok(ids)
}
