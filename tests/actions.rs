use labtwin::setup::{rack_with_tips, rack_with_vials};
use labtwin::{
    ActOutcome, ActionError, ActionParams, ActorType, ContentError, Instruction, Lab, LabObject,
    ObjectKind, PostActError, PreActError, RegistryError, SINGLE_SLOT,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ============================================================================
// FIXTURE
// ============================================================================

fn chem(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn params(v: Value) -> ActionParams {
    v.as_object().cloned().expect("params must be a JSON object")
}

/// A gantry over five deck slots, a wash bay and a tip bin.
fn bench() -> Lab {
    use ObjectKind::*;
    let mut lab = Lab::new();
    for (id, kind) in [
        ("SLOT-A", Slot),
        ("SLOT-B", Slot),
        ("SLOT-R", Slot),
        ("SLOT-PDP", Slot),
        ("SLOT-SV", Slot),
        ("WASH", WashBay),
        ("DISPOSAL", TipDisposal),
        ("ARM", ArmPlatform),
        ("Z1", ArmZ1),
        ("Z2", ArmZ2),
        ("NEEDLE-1", Z1Needle),
        ("NEEDLE-2", Z1Needle),
        ("PDP", Pdp),
        ("SVT", SvTool),
        ("MAGE", Mage),
    ] {
        lab.add_object(LabObject::new(id, kind)).unwrap();
    }
    lab.add_object(LabObject::new("ReagentRack", Rack).with_capacity(2))
        .unwrap();
    lab.add_object(
        LabObject::new("SOURCE", Vial).with_content(&chem(&[("water", 10.0), ("ethanol", 5.0)])),
    )
    .unwrap();
    lab.add_object(LabObject::new("POWDER", Vial).with_content(&chem(&[("salt", 2.0)])))
        .unwrap();
    rack_with_vials(&mut lab, "VialRack1", 4, 2, "HRV").unwrap();
    rack_with_tips(&mut lab, "TipRack", 4, 2).unwrap();

    for (what, into, slot) in [
        ("Z1", "ARM", "z1"),
        ("Z2", "ARM", "z2"),
        ("NEEDLE-1", "Z1", "1"),
        ("NEEDLE-2", "Z1", "2"),
        ("PDP", "SLOT-PDP", SINGLE_SLOT),
        ("SVT", "SLOT-SV", SINGLE_SLOT),
        ("POWDER", "SVT", SINGLE_SLOT),
        ("ReagentRack", "SLOT-R", SINGLE_SLOT),
        ("SOURCE", "ReagentRack", "1"),
        ("VialRack1", "SLOT-A", SINGLE_SLOT),
        ("TipRack", "SLOT-B", SINGLE_SLOT),
    ] {
        lab.move_object(what, into, slot).unwrap();
    }
    lab
}

/// pre, then post.
fn run(lab: &mut Lab, device: &str, action: &str, p: Value) -> Result<(), ActionError> {
    let p = params(p);
    lab.act(device, action, ActorType::Pre, &p)?;
    lab.act(device, action, ActorType::Post, &p)?;
    Ok(())
}

fn move_arm(lab: &mut Lab, anchor: &str, slot: &str) {
    run(
        lab,
        "ARM",
        "move_to",
        json!({ "anchor_arm": anchor, "move_to_slot": slot }),
    )
    .unwrap_or_else(|e| panic!("move to {} failed: {}", slot, e));
}

/// Z2 holding the PDP with TipRack/PdpTip-1 mounted.
fn arm_with_tip(lab: &mut Lab) {
    move_arm(lab, "z2", "SLOT-PDP");
    run(lab, "Z2", "pick_up", json!({ "thing": "PDP" })).unwrap();
    move_arm(lab, "z2", "SLOT-B");
    run(lab, "Z2", "pick_up", json!({ "thing": "TipRack/PdpTip-1" })).unwrap();
}

// ============================================================================
// DISPATCH
// ============================================================================

#[test]
fn test_action_tables_per_kind() {
    let lab = bench();

    assert_eq!(
        lab.action_names("Z2").unwrap(),
        vec![
            "aspirate_pdp",
            "dispense_pdp",
            "dispense_sv",
            "dummy",
            "pick_up",
            "put_down"
        ]
    );
    assert_eq!(
        lab.action_names("Z1").unwrap(),
        vec!["concurrent_aspirate", "concurrent_dispense", "dummy", "wash"]
    );
    assert_eq!(lab.action_names("ARM").unwrap(), vec!["dummy", "move_to"]);
    assert_eq!(lab.action_names("SLOT-A").unwrap(), vec!["dummy", "wait"]);
    assert_eq!(
        lab.action_names("MAGE").unwrap(),
        vec![
            "annihilate_vials",
            "create_vials",
            "dummy",
            "set_vial_chemical_content"
        ]
    );
    assert!(matches!(
        lab.action_names("SOURCE"),
        Err(ActionError::NotADevice(_))
    ));
}

#[test]
fn test_unknown_action_is_a_usage_error() {
    let mut lab = bench();
    let err = lab
        .act("Z2", "fly", ActorType::Pre, &ActionParams::new())
        .unwrap_err();
    match err {
        ActionError::UnknownAction {
            device,
            action,
            available,
        } => {
            assert_eq!(device, "Z2");
            assert_eq!(action, "fly");
            assert!(available.contains(&"pick_up"));
        }
        other => panic!("expected UnknownAction, got {:?}", other),
    }
}

#[test]
fn test_dummy_does_nothing() {
    let mut lab = bench();
    let before = lab.state_digest();

    for phase in [ActorType::Proj, ActorType::Pre, ActorType::Post] {
        let out = lab.act("MAGE", "dummy", phase, &ActionParams::new()).unwrap();
        if let ActOutcome::Projected(p) = out {
            assert!(p.involved.is_empty());
            assert_eq!(p.duration, 0.0);
        }
    }
    assert_eq!(lab.state_digest(), before);
}

#[test]
fn test_act_by_instruction_checks_device() {
    let mut lab = bench();
    let ins = Instruction::new("Z1", "dummy").with_id("i1");

    assert!(matches!(
        lab.act_by_instruction("Z2", &ins, ActorType::Pre),
        Err(ActionError::DeviceMismatch { .. })
    ));
    assert_eq!(
        lab.act_by_instruction("Z1", &ins, ActorType::Post).unwrap(),
        ActOutcome::Committed
    );
}

#[test]
fn test_missing_parameter_fails_validation() {
    let lab = bench();
    let err = lab
        .validate_action("ARM", "move_to", &params(json!({ "anchor_arm": "z2" })))
        .unwrap_err();
    assert!(matches!(err, ActionError::Pre(PreActError::Parameter(_))));
}

// ============================================================================
// PROJECTIONS
// ============================================================================

#[test]
fn test_projection_locks_what_moves() {
    let mut lab = bench();
    lab.add_object(LabObject::new("BAR", ObjectKind::StirBar))
        .unwrap();
    lab.move_object("BAR", "VialRack1/vial-1", SINGLE_SLOT)
        .unwrap();

    // The destination slot is locked together with everything sitting on it.
    let proj = lab
        .project_action("ARM", "move_to", &params(json!({ "anchor_arm": "z1", "move_to_slot": "SLOT-A" })))
        .unwrap();
    assert_eq!(proj.duration, lab.timings().arm_move);
    for id in [
        "Z1",
        "Z2",
        "NEEDLE-1",
        "NEEDLE-2",
        "SLOT-A",
        "VialRack1",
        "VialRack1/vial-1",
        "VialRack1/vial-2",
        "BAR",
    ] {
        assert!(proj.involved.iter().any(|x| x == id), "missing {}", id);
    }

    let proj = lab
        .project_action(
            "MAGE",
            "set_vial_chemical_content",
            &params(json!({ "vial": "VialRack1/vial-1", "chemical": { "salt": 0.5 }, "time_cost": 1.0 })),
        )
        .unwrap();
    for id in ["VialRack1/vial-1", "BAR"] {
        assert!(proj.involved.iter().any(|x| x == id), "missing {}", id);
    }

    let proj = lab
        .project_action(
            "MAGE",
            "create_vials",
            &params(json!({
                "vials": ["NEW-1"],
                "in_rack": "VialRack1",
                "in_rack_slot_keys": ["3"],
                "time_cost": 1.0,
            })),
        )
        .unwrap();
    for id in ["VialRack1", "VialRack1/vial-1", "VialRack1/vial-2", "BAR", "NEW-1"] {
        assert!(proj.involved.iter().any(|x| x == id), "missing {}", id);
    }

    let proj = lab
        .project_action("Z2", "pick_up", &params(json!({ "thing": "PDP" })))
        .unwrap();
    assert_eq!(proj.duration, lab.timings().pick_up);
    for id in ["ARM", "PDP", "SLOT-PDP"] {
        assert!(proj.involved.iter().any(|x| x == id), "missing {}", id);
    }
}

#[test]
fn test_wait_locks_everything_on_the_slot() {
    let lab = bench();
    let p = params(json!({ "wait_time": 60.0 }));

    let proj = lab.project_action("SLOT-A", "wait", &p).unwrap();
    assert_eq!(proj.duration, 60.0);
    let mut involved = proj.involved.clone();
    involved.sort();
    assert_eq!(
        involved,
        vec!["VialRack1", "VialRack1/vial-1", "VialRack1/vial-2"]
    );

    let negative = params(json!({ "wait_time": -1.0 }));
    assert!(lab.validate_action("SLOT-A", "wait", &negative).is_err());
    assert!(matches!(
        lab.project_action("SLOT-A", "wait", &negative),
        Err(ActionError::Pre(PreActError::Precondition(_)))
    ));
}

#[test]
fn test_flow_durations_scale_with_amount() {
    let mut lab = bench();
    move_arm(&mut lab, "z2", "SLOT-SV");
    run(&mut lab, "Z2", "pick_up", json!({ "thing": "SVT" })).unwrap();

    let t = lab.timings().clone();
    let proj = lab
        .project_action(
            "Z2",
            "dispense_sv",
            &params(json!({ "destination_container": "VialRack1/vial-2", "amount": 0.5 })),
        )
        .unwrap();
    assert!(close(proj.duration, t.dispense_base + 0.5 / t.sv_dispense_rate));
}

// ============================================================================
// Z2 HEAD
// ============================================================================

#[test]
fn test_pick_up_requires_positioning() {
    let mut lab = bench();
    let before = lab.state_digest();

    let err = lab
        .act("Z2", "pick_up", ActorType::Pre, &params(json!({ "thing": "PDP" })))
        .unwrap_err();
    assert!(matches!(err, ActionError::Pre(PreActError::Precondition(_))));

    // Skipping pre does not help: post re-checks and refuses.
    let err = lab
        .act("Z2", "pick_up", ActorType::Post, &params(json!({ "thing": "PDP" })))
        .unwrap_err();
    assert!(matches!(
        err,
        ActionError::Post(PostActError::IllegalTransition(_))
    ));
    assert_eq!(lab.state_digest(), before);

    // Over the right slot but aligned on the wrong head.
    move_arm(&mut lab, "z1", "SLOT-PDP");
    assert!(lab
        .validate_action("Z2", "pick_up", &params(json!({ "thing": "PDP" })))
        .is_err());
}

#[test]
fn test_bare_head_only_grabs_tools() {
    let mut lab = bench();
    move_arm(&mut lab, "z2", "SLOT-B");
    let err = lab
        .validate_action("Z2", "pick_up", &params(json!({ "thing": "TipRack/PdpTip-1" })))
        .unwrap_err();
    assert!(matches!(err, ActionError::Pre(PreActError::Precondition(_))));
}

#[test]
fn test_pick_up_tool_then_tip() {
    let mut lab = bench();
    arm_with_tip(&mut lab);

    let pdp = lab.get("PDP").unwrap();
    assert_eq!(pdp.contained_by(), Some("Z2"));
    assert_eq!(
        pdp.slots().unwrap().occupant(SINGLE_SLOT).map(String::as_str),
        Some("TipRack/PdpTip-1")
    );
    assert!(lab
        .get("SLOT-PDP")
        .unwrap()
        .slots()
        .unwrap()
        .is_empty());
    assert_eq!(
        lab.get("TipRack").unwrap().slots().unwrap().empty_slot_keys(),
        vec!["1", "3", "4"]
    );

    let platform = lab.get("ARM").unwrap();
    assert_eq!(platform.attribute_str("position_on_top_of"), Some("SLOT-B"));
    assert_eq!(platform.attribute_str("anchor_arm"), Some("z2"));
}

#[test]
fn test_pdp_transfer_moves_liquid() {
    let mut lab = bench();
    arm_with_tip(&mut lab);

    move_arm(&mut lab, "z2", "SLOT-R");
    run(
        &mut lab,
        "Z2",
        "aspirate_pdp",
        json!({ "source_container": "SOURCE", "amount": 3.0 }),
    )
    .unwrap();

    let tip = lab.content_of("TipRack/PdpTip-1").unwrap();
    assert!(close(tip.amount_of("water"), 2.0));
    assert!(close(tip.amount_of("ethanol"), 1.0));
    assert!(close(lab.content_of("SOURCE").unwrap().content_sum(), 12.0));

    // Dispensing needs the arm over the destination's slot.
    let dispense = json!({ "destination_container": "VialRack1/vial-1", "amount": 3.0 });
    assert!(run(&mut lab, "Z2", "dispense_pdp", dispense.clone()).is_err());

    move_arm(&mut lab, "z2", "SLOT-A");
    run(&mut lab, "Z2", "dispense_pdp", dispense).unwrap();

    let vial = lab.content_of("VialRack1/vial-1").unwrap();
    assert!(close(vial.amount_of("water"), 2.0));
    assert!(close(vial.amount_of("ethanol"), 1.0));
    assert!(lab.content_of("TipRack/PdpTip-1").unwrap().is_empty());
}

#[test]
fn test_aspirate_more_than_available_fails_pre() {
    let mut lab = bench();
    arm_with_tip(&mut lab);
    move_arm(&mut lab, "z2", "SLOT-R");

    let err = lab
        .validate_action(
            "Z2",
            "aspirate_pdp",
            &params(json!({ "source_container": "SOURCE", "amount": 50.0 })),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ActionError::Pre(PreActError::Content(ContentError::InsufficientContent { .. }))
    ));
}

#[test]
fn test_put_down_tip_into_disposal() {
    let mut lab = bench();
    arm_with_tip(&mut lab);

    move_arm(&mut lab, "z2", "DISPOSAL");
    run(&mut lab, "Z2", "put_down", json!({ "dest_slot": "DISPOSAL" })).unwrap();

    let tip = lab.get("TipRack/PdpTip-1").unwrap();
    assert_eq!(tip.contained_by(), None);
    assert!(lab.get("PDP").unwrap().slots().unwrap().is_empty());
    assert_eq!(
        lab.get("DISPOSAL").unwrap().attribute("disposal_content"),
        Some(&json!(["TipRack/PdpTip-1"]))
    );

    // Only tips go in the bin; the bare PDP must be parked on a slot.
    assert!(lab
        .validate_action("Z2", "put_down", &params(json!({ "dest_slot": "DISPOSAL" })))
        .is_err());
    move_arm(&mut lab, "z2", "SLOT-PDP");
    run(&mut lab, "Z2", "put_down", json!({ "dest_slot": "SLOT-PDP" })).unwrap();
    assert_eq!(lab.get("PDP").unwrap().contained_by(), Some("SLOT-PDP"));
    assert!(lab.get("Z2").unwrap().slots().unwrap().is_empty());
}

#[test]
fn test_put_down_into_named_slot() {
    let mut lab = bench();
    arm_with_tip(&mut lab);

    let p = params(json!({ "dest_slot": "TipRack", "dest_slot_key": "2" }));
    assert!(matches!(
        lab.validate_action("Z2", "put_down", &p),
        Err(ActionError::Pre(PreActError::Containment(_)))
    ));

    run(
        &mut lab,
        "Z2",
        "put_down",
        json!({ "dest_slot": "TipRack", "dest_slot_key": "4" }),
    )
    .unwrap();
    assert_eq!(
        lab.get("TipRack/PdpTip-1").unwrap().contained_in_slot(),
        Some("4")
    );
}

#[test]
fn test_sv_tool_doses_powder() {
    let mut lab = bench();
    move_arm(&mut lab, "z2", "SLOT-SV");
    run(&mut lab, "Z2", "pick_up", json!({ "thing": "SVT" })).unwrap();
    assert_eq!(lab.get("POWDER").unwrap().contained_by(), Some("SVT"));

    move_arm(&mut lab, "z2", "SLOT-A");
    run(
        &mut lab,
        "Z2",
        "dispense_sv",
        json!({ "destination_container": "VialRack1/vial-2", "amount": 0.5 }),
    )
    .unwrap();

    assert!(close(
        lab.content_of("VialRack1/vial-2").unwrap().amount_of("salt"),
        0.5
    ));
    assert!(close(lab.content_of("POWDER").unwrap().amount_of("salt"), 1.5));
}

// ============================================================================
// Z1 NEEDLES
// ============================================================================

#[test]
fn test_needles_split_and_wash() {
    let mut lab = bench();
    move_arm(&mut lab, "z1", "SLOT-R");
    run(
        &mut lab,
        "Z1",
        "concurrent_aspirate",
        json!({
            "source_containers": ["SOURCE", "SOURCE"],
            "dispenser_containers": ["NEEDLE-1", "NEEDLE-2"],
            "amounts": [1.5, 1.5],
        }),
    )
    .unwrap();
    assert!(close(lab.content_of("SOURCE").unwrap().content_sum(), 12.0));

    move_arm(&mut lab, "z1", "SLOT-A");
    run(
        &mut lab,
        "Z1",
        "concurrent_dispense",
        json!({
            "destination_containers": ["VialRack1/vial-1", "VialRack1/vial-2"],
            "dispenser_containers": ["NEEDLE-1", "NEEDLE-2"],
            "amounts": [1.0, 1.0],
        }),
    )
    .unwrap();
    assert!(close(lab.content_of("VialRack1/vial-1").unwrap().content_sum(), 1.0));
    assert!(close(lab.content_of("NEEDLE-2").unwrap().content_sum(), 0.5));

    move_arm(&mut lab, "z1", "WASH");
    run(&mut lab, "Z1", "wash", json!({ "wash_bay": "WASH" })).unwrap();
    assert!(lab.content_of("NEEDLE-1").unwrap().chemical_content().is_empty());
    assert!(lab.content_of("NEEDLE-2").unwrap().chemical_content().is_empty());
}

#[test]
fn test_needle_parameters_are_checked() {
    let mut lab = bench();
    move_arm(&mut lab, "z1", "SLOT-A");

    let mismatched = params(json!({
        "destination_containers": ["VialRack1/vial-1"],
        "dispenser_containers": ["NEEDLE-1", "NEEDLE-2"],
        "amounts": [0.0, 0.0],
    }));
    assert!(matches!(
        lab.validate_action("Z1", "concurrent_dispense", &mismatched),
        Err(ActionError::Pre(PreActError::Parameter(_)))
    ));

    let twice = params(json!({
        "source_containers": ["VialRack1/vial-1", "VialRack1/vial-2"],
        "dispenser_containers": ["NEEDLE-1", "NEEDLE-1"],
        "amounts": [0.0, 0.0],
    }));
    assert!(lab.validate_action("Z1", "concurrent_aspirate", &twice).is_err());

    // SOURCE sits on SLOT-R, the vials on SLOT-A.
    lab.add_content("VialRack1/vial-1", &chem(&[("water", 1.0)]))
        .unwrap();
    let spread = params(json!({
        "source_containers": ["SOURCE", "VialRack1/vial-1"],
        "dispenser_containers": ["NEEDLE-1", "NEEDLE-2"],
        "amounts": [0.5, 0.5],
    }));
    assert!(matches!(
        lab.validate_action("Z1", "concurrent_aspirate", &spread),
        Err(ActionError::Pre(PreActError::Precondition(_)))
    ));
}

#[test]
fn test_shared_source_draws_are_checked_together() {
    let mut lab = bench();
    move_arm(&mut lab, "z1", "SLOT-R");

    // Each draw fits on its own, together they exceed the 15 mL in SOURCE.
    let p = params(json!({
        "source_containers": ["SOURCE", "SOURCE"],
        "dispenser_containers": ["NEEDLE-1", "NEEDLE-2"],
        "amounts": [10.0, 10.0],
    }));
    assert!(matches!(
        lab.validate_action("Z1", "concurrent_aspirate", &p),
        Err(ActionError::Pre(PreActError::Content(
            ContentError::InsufficientContent { .. }
        )))
    ));

    let before = lab.state_digest();
    let err = lab.act("Z1", "concurrent_aspirate", ActorType::Post, &p).unwrap_err();
    assert!(matches!(
        err,
        ActionError::Post(PostActError::IllegalTransition(_))
    ));
    assert_eq!(lab.state_digest(), before);
    assert!(close(lab.content_of("SOURCE").unwrap().content_sum(), 15.0));
    assert!(lab.content_of("NEEDLE-1").unwrap().is_empty());

    run(
        &mut lab,
        "Z1",
        "concurrent_aspirate",
        json!({
            "source_containers": ["SOURCE", "SOURCE"],
            "dispenser_containers": ["NEEDLE-1", "NEEDLE-2"],
            "amounts": [7.0, 7.0],
        }),
    )
    .unwrap();
    assert!(close(lab.content_of("SOURCE").unwrap().content_sum(), 1.0));
    assert!(close(lab.content_of("NEEDLE-2").unwrap().content_sum(), 7.0));
}

// ============================================================================
// SETUP DEVICE
// ============================================================================

#[test]
fn test_mage_vial_lifecycle() {
    let mut lab = bench();

    run(
        &mut lab,
        "MAGE",
        "create_vials",
        json!({
            "vials": ["NEW-1", "NEW-2"],
            "in_rack": "VialRack1",
            "in_rack_slot_keys": [3, "4"],
            "time_cost": 2.0,
        }),
    )
    .unwrap();
    let new1 = lab.get("NEW-1").unwrap();
    assert_eq!(new1.contained_by(), Some("VialRack1"));
    assert_eq!(new1.contained_in_slot(), Some("3"));
    assert_eq!(new1.attribute_str("vial_type"), Some("HRV"));
    assert!(lab
        .get("VialRack1")
        .unwrap()
        .slots()
        .unwrap()
        .empty_slot_keys()
        .is_empty());

    run(
        &mut lab,
        "MAGE",
        "set_vial_chemical_content",
        json!({ "vial": "NEW-1", "chemical": { "salt": 0.5 }, "time_cost": 1.0 }),
    )
    .unwrap();
    assert!(close(lab.content_of("NEW-1").unwrap().amount_of("salt"), 0.5));

    run(
        &mut lab,
        "MAGE",
        "annihilate_vials",
        json!({ "vials": ["NEW-1", "NEW-2"], "time_cost": 1.0 }),
    )
    .unwrap();
    assert!(!lab.contains("NEW-1"));
    assert!(!lab.contains("NEW-2"));
    assert_eq!(
        lab.get("VialRack1").unwrap().slots().unwrap().empty_slot_keys(),
        vec!["3", "4"]
    );
}

#[test]
fn test_mage_refuses_bad_requests() {
    let lab = bench();

    let duplicate = params(json!({
        "vials": ["SOURCE"],
        "in_rack": "VialRack1",
        "in_rack_slot_keys": ["3"],
        "time_cost": 1.0,
    }));
    assert!(matches!(
        lab.validate_action("MAGE", "create_vials", &duplicate),
        Err(ActionError::Pre(PreActError::Registry(
            RegistryError::DuplicateIdentifier(_)
        )))
    ));

    let occupied = params(json!({
        "vials": ["NEW-1"],
        "in_rack": "VialRack1",
        "in_rack_slot_keys": ["1"],
        "time_cost": 1.0,
    }));
    assert!(lab.validate_action("MAGE", "create_vials", &occupied).is_err());

    let tip_rack = params(json!({
        "vials": ["NEW-1"],
        "in_rack": "TipRack",
        "in_rack_slot_keys": ["3"],
        "time_cost": 1.0,
    }));
    assert!(lab.validate_action("MAGE", "create_vials", &tip_rack).is_err());

    // POWDER sits in the SV tool, not in a rack.
    let not_racked = params(json!({ "vials": ["POWDER"], "time_cost": 1.0 }));
    assert!(lab
        .validate_action("MAGE", "annihilate_vials", &not_racked)
        .is_err());

    let negative = params(json!({
        "vial": "SOURCE",
        "chemical": { "water": 1.0 },
        "time_cost": -3.0,
    }));
    assert!(lab
        .validate_action("MAGE", "set_vial_chemical_content", &negative)
        .is_err());
}
