use labtwin::{ContainmentError, Lab, LabObject, ObjectKind, RegistryError, SINGLE_SLOT};

fn occupant(lab: &Lab, container: &str, slot: &str) -> Option<String> {
    lab.get(container)
        .expect("container registered")
        .slots()
        .and_then(|t| t.occupant(slot))
        .cloned()
}

/// SLOT-1 <- RACK <- {V1 in "1", V2 in "2"}
fn small_deck() -> Lab {
    let mut lab = Lab::new();
    lab.add_object(LabObject::new("SLOT-1", ObjectKind::Slot)).unwrap();
    lab.add_object(LabObject::new("RACK", ObjectKind::Rack)).unwrap();
    lab.add_object(LabObject::new("V1", ObjectKind::Vial)).unwrap();
    lab.add_object(LabObject::new("V2", ObjectKind::Vial)).unwrap();
    lab.move_object("RACK", "SLOT-1", SINGLE_SLOT).unwrap();
    lab.move_object("V1", "RACK", "1").unwrap();
    lab.move_object("V2", "RACK", "2").unwrap();
    lab
}

#[test]
fn test_move_links_both_sides() {
    let mut lab = small_deck();

    let v1 = lab.get("V1").unwrap();
    assert_eq!(v1.contained_by(), Some("RACK"));
    assert_eq!(v1.contained_in_slot(), Some("1"));
    assert_eq!(occupant(&lab, "RACK", "1").as_deref(), Some("V1"));

    lab.move_object("V1", "RACK", "3").expect("slot 3 is free");

    let v1 = lab.get("V1").unwrap();
    assert_eq!(v1.contained_in_slot(), Some("3"));
    assert_eq!(occupant(&lab, "RACK", "3").as_deref(), Some("V1"));
    assert_eq!(occupant(&lab, "RACK", "1"), None);
    assert_eq!(
        lab.get("RACK").unwrap().slots().unwrap().empty_slot_keys(),
        vec!["1".to_string(), "4".to_string()]
    );
}

#[test]
fn test_move_between_containers_clears_source() {
    let mut lab = small_deck();
    lab.add_object(LabObject::new("RACK-2", ObjectKind::Rack).with_capacity(2))
        .unwrap();

    lab.move_object("V2", "RACK-2", "2").unwrap();

    assert_eq!(occupant(&lab, "RACK", "2"), None);
    assert_eq!(occupant(&lab, "RACK-2", "2").as_deref(), Some("V2"));
    assert_eq!(lab.get("V2").unwrap().contained_by(), Some("RACK-2"));
}

#[test]
fn test_move_onto_own_slot_is_noop() {
    let mut lab = small_deck();
    let before = lab.state_digest();
    lab.move_object("V1", "RACK", "1").expect("no-op move");
    assert_eq!(lab.state_digest(), before);
}

#[test]
fn test_move_to_occupied_slot_changes_nothing() {
    let mut lab = small_deck();
    let before = lab.state_digest();

    let err = lab.move_object("V2", "RACK", "1").unwrap_err();
    assert_eq!(
        err,
        ContainmentError::SlotOccupied {
            container: "RACK".into(),
            slot: "1".into(),
            occupant: "V1".into(),
        }
    );
    assert_eq!(lab.state_digest(), before);
    assert_eq!(lab.get("V2").unwrap().contained_in_slot(), Some("2"));
}

#[test]
fn test_move_rejects_bad_destinations() {
    let mut lab = small_deck();
    lab.add_object(LabObject::new("BAR", ObjectKind::StirBar)).unwrap();
    lab.add_object(LabObject::new("TIP", ObjectKind::PdpTip)).unwrap();

    assert!(matches!(
        lab.move_object("BAR", "RACK", "3"),
        Err(ContainmentError::NotAccepted { kind: ObjectKind::StirBar, .. })
    ));
    assert!(matches!(
        lab.move_object("V1", "RACK", "9"),
        Err(ContainmentError::UnknownSlot { .. })
    ));
    assert!(matches!(
        lab.move_object("V1", "TIP", SINGLE_SLOT),
        Err(ContainmentError::NotAContainer(_))
    ));
    assert!(matches!(
        lab.move_object("SLOT-1", "RACK", "3"),
        Err(ContainmentError::NotAContainee(_))
    ));
    assert!(matches!(
        lab.move_object("GHOST", "RACK", "3"),
        Err(ContainmentError::Registry(RegistryError::UnknownIdentifier(_)))
    ));

    // The stir bar does fit inside a vial.
    lab.move_object("BAR", "V1", SINGLE_SLOT).unwrap();
    assert_eq!(occupant(&lab, "V1", SINGLE_SLOT).as_deref(), Some("BAR"));
}

#[test]
fn test_move_rejects_cycles() {
    let mut lab = Lab::new();
    lab.add_object(LabObject::new("OUTER", ObjectKind::Rack).with_accepts(vec![]))
        .unwrap();
    lab.add_object(LabObject::new("INNER", ObjectKind::Rack).with_accepts(vec![]))
        .unwrap();
    lab.move_object("INNER", "OUTER", "1").unwrap();

    assert!(matches!(
        lab.move_object("OUTER", "INNER", "1"),
        Err(ContainmentError::CyclicContainment { .. })
    ));
    assert!(matches!(
        lab.move_object("OUTER", "OUTER", "2"),
        Err(ContainmentError::CyclicContainment { .. })
    ));
}

#[test]
fn test_get_container_walks_up() {
    let lab = small_deck();

    assert_eq!(lab.get_container("V1", None).unwrap().identifier(), "RACK");
    assert_eq!(
        lab.get_container("V1", Some(ObjectKind::Slot))
            .unwrap()
            .identifier(),
        "SLOT-1"
    );
    // Free objects answer with themselves.
    assert_eq!(lab.get_container("SLOT-1", None).unwrap().identifier(), "SLOT-1");
    // No ancestor of the requested kind: the outermost one.
    assert_eq!(
        lab.get_container("V1", Some(ObjectKind::ArmZ2))
            .unwrap()
            .identifier(),
        "SLOT-1"
    );
    assert_eq!(
        lab.ancestors("V1").unwrap(),
        vec!["RACK".to_string(), "SLOT-1".to_string()]
    );
}

#[test]
fn test_resource_closure_counts_nested() {
    let mut lab = Lab::new();
    lab.add_object(
        LabObject::new("TRAY", ObjectKind::Rack)
            .with_capacity(2)
            .with_accepts(vec![ObjectKind::Rack]),
    )
    .unwrap();
    for (rack, vial) in [("RACK-A", "VA"), ("RACK-B", "VB")] {
        lab.add_object(LabObject::new(rack, ObjectKind::Rack)).unwrap();
        lab.add_object(LabObject::new(vial, ObjectKind::Vial)).unwrap();
        lab.move_object(vial, rack, "1").unwrap();
    }
    lab.move_object("RACK-A", "TRAY", "1").unwrap();
    lab.move_object("RACK-B", "TRAY", "2").unwrap();

    let mut closure = lab.resource_closure("TRAY").unwrap();
    closure.sort();
    assert_eq!(closure, vec!["RACK-A", "RACK-B", "VA", "VB"]);

    // Depth does not matter: a slot above the tray sees all of it.
    lab.add_object(LabObject::new("SLOT", ObjectKind::Slot).with_accepts(vec![]))
        .unwrap();
    lab.move_object("TRAY", "SLOT", SINGLE_SLOT).unwrap();
    assert_eq!(lab.resource_closure("SLOT").unwrap().len(), 5);
    assert!(lab.resource_closure("VA").unwrap().is_empty());
}

#[test]
fn test_registry_identity_rules() {
    let mut lab = small_deck();

    assert_eq!(
        lab.add_object(LabObject::new("V1", ObjectKind::Vial)),
        Err(RegistryError::DuplicateIdentifier("V1".into()))
    );
    assert_eq!(
        lab.remove_object("GHOST").unwrap_err(),
        RegistryError::UnknownIdentifier("GHOST".into())
    );

    // Still held: must be detached first.
    assert!(matches!(
        lab.remove_object("V1"),
        Err(RegistryError::StillContained { .. })
    ));
    // Still holding something.
    lab.detach_object("RACK").unwrap();
    assert!(matches!(
        lab.remove_object("RACK"),
        Err(RegistryError::StillContained { .. })
    ));

    lab.detach_object("V1").unwrap();
    assert_eq!(occupant(&lab, "RACK", "1"), None);
    let removed = lab.remove_object("V1").expect("free vial can go");
    assert_eq!(removed.identifier(), "V1");
    assert!(!lab.contains("V1"));
    assert_eq!(lab.objects_of_kind(ObjectKind::Vial).len(), 1);
}

#[test]
fn test_state_excludes_layout_and_tracks_links() {
    let mut lab = small_deck();
    lab.add_object(
        LabObject::new("SLOT-2", ObjectKind::Slot)
            .with_attribute("can_heat", true)
            .with_layout(labtwin::Layout {
                x: 1.0,
                y: 2.0,
                width: 80.0,
                height: 120.0,
            }),
    )
    .unwrap();

    let state = lab.state();
    let slot2 = &state["SLOT-2"];
    assert_eq!(slot2["can_heat"], serde_json::json!(true));
    assert!(slot2.get("layout").is_none());
    assert_eq!(slot2["slot_content"][SINGLE_SLOT], serde_json::Value::Null);

    let v1 = &state["V1"];
    assert_eq!(v1["contained_by"], "RACK");
    assert_eq!(v1["contained_in_slot"], "1");
    assert_eq!(state["RACK"]["slot_content"]["1"], "V1");
}
