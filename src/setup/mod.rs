//! LabTwin bench documents (YAML)
//!
//! # Philosophy
//! A bench document is the **construction-time** description of a benchtop:
//! which objects exist, where they sit, what they contain, and which
//! instructions should run on them. It is plain data; every physical
//! invariant is enforced by the [`Lab`] while the document is built, so a
//! document that loads is a document whose initial state is consistent.
//!
//! # Notes
//! - Validation is strict and happens before anything is registered.
//! - Placements are applied after all objects exist, so containers may be
//!   declared after their contents.
//! - `after` may only reference instructions declared earlier; `chains` may
//!   reference any instruction.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ActionParams;
use crate::containment::SlotRef;
use crate::core::{Identifier, LabObject, Layout, ObjectKind};
use crate::devices::ActionTimings;
use crate::error::LabError;
use crate::instruction::{Instruction, PrecedingType};
use crate::lab::Lab;

pub mod racks;

pub use racks::{rack_with_tips, rack_with_vials};

/// Bench document version supported by this implementation.
pub const SUPPORTED_BENCH_VERSION: u32 = 1;

// =============================================================================
// Errors
// =============================================================================

/// What went wrong while turning a bench document into a [`Lab`].
#[derive(Debug, Clone, PartialEq)]
pub enum SetupErrorKind {
    /// The file could not be read.
    Io,
    /// Not YAML/JSON, or not shaped like a bench document.
    Parse,
    Version { found: u32 },
    /// Well-formed but inconsistent: ids, kinds or references.
    Validation,
    /// Valid, but the lab refused an object, placement or instruction.
    Build(LabError),
}

/// A bench loading failure plus the trail of where it happened, innermost
/// first.
#[derive(Debug)]
pub struct SetupError {
    pub kind: SetupErrorKind,
    pub context: Vec<String>,
}

impl SetupError {
    fn with_message(kind: SetupErrorKind, msg: String) -> Self {
        Self {
            kind,
            context: vec![msg],
        }
    }

    pub fn io(err: impl fmt::Display, path: impl Into<String>) -> Self {
        Self::with_message(SetupErrorKind::Io, format!("{}: {}", path.into(), err))
    }

    pub fn parse(err: impl fmt::Display) -> Self {
        Self::with_message(SetupErrorKind::Parse, err.to_string())
    }

    pub fn version(found: u32) -> Self {
        Self {
            kind: SetupErrorKind::Version { found },
            context: Vec::new(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(SetupErrorKind::Validation, msg.into())
    }

    pub fn build(err: impl Into<LabError>) -> Self {
        Self {
            kind: SetupErrorKind::Build(err.into()),
            context: Vec::new(),
        }
    }

    pub fn push_context(mut self, msg: impl Into<String>) -> Self {
        self.context.push(msg.into());
        self
    }

    /// The registry error behind a `Build` failure.
    pub fn lab_error(&self) -> Option<&LabError> {
        match &self.kind {
            SetupErrorKind::Build(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SetupErrorKind::Io => f.write_str("bench document unreadable")?,
            SetupErrorKind::Parse => f.write_str("bench document malformed")?,
            SetupErrorKind::Version { found } => write!(
                f,
                "bench version {found} unsupported (this build reads {SUPPORTED_BENCH_VERSION})"
            )?,
            SetupErrorKind::Validation => f.write_str("bench document invalid")?,
            SetupErrorKind::Build(e) => write!(f, "bench document does not build: {e}")?,
        }
        for line in &self.context {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.lab_error().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// =============================================================================
// Document Types
// =============================================================================

/// Top-level YAML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchSpec {
    pub version: u32,
    pub metadata: Metadata,
    #[serde(default)]
    pub timings: ActionTimings,
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
    #[serde(default)]
    pub racks: Vec<RackSpec>,
    #[serde(default)]
    pub instructions: Vec<InstructionSpec>,
    #[serde(default)]
    pub chains: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub id: String,
    pub kind: ObjectKind,
    /// Numbered slots "1".."capacity".
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Named slots; exclusive with `capacity`.
    #[serde(default)]
    pub slots: Option<Vec<String>>,
    #[serde(default)]
    pub accepts: Option<Vec<ObjectKind>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub layout: Option<Layout>,
    #[serde(default)]
    pub content: BTreeMap<String, f64>,
    #[serde(default)]
    pub placement: Option<SlotRef>,
}

/// A rack pre-filled with vials or PDP tips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackSpec {
    pub id: String,
    pub fill: RackFill,
    #[serde(default = "default_rack_capacity")]
    pub capacity: usize,
    pub count: usize,
    #[serde(default = "default_vial_type")]
    pub vial_type: String,
    #[serde(default)]
    pub placement: Option<SlotRef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RackFill {
    Vial,
    PdpTip,
}

fn default_rack_capacity() -> usize {
    4
}

fn default_vial_type() -> String {
    "HRV".to_string()
}

impl RackSpec {
    /// Ids of the generated containees, in slot order.
    pub fn member_ids(&self) -> Vec<String> {
        (1..=self.count)
            .map(|k| match self.fill {
                RackFill::Vial => format!("{}/vial-{}", self.id, k),
                RackFill::PdpTip => format!("{}/PdpTip-{}", self.id, k),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionSpec {
    pub id: String,
    pub device: String,
    pub action: String,
    #[serde(default)]
    pub params: ActionParams,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub gating: PrecedingType,
}

// =============================================================================
// Public API
// =============================================================================

/// Load, parse and validate a YAML bench document.
pub fn load_yaml(path: impl AsRef<Path>) -> Result<BenchSpec, SetupError> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).map_err(|e| SetupError::io(e, path.display().to_string()))?;
    from_yaml_str(&raw).map_err(|e| e.push_context(format!("in file: {}", path.display())))
}

/// Parse and validate a bench document held in memory. JSON is accepted too.
pub fn from_yaml_str(raw: &str) -> Result<BenchSpec, SetupError> {
    let spec: BenchSpec = serde_yaml::from_str(raw).map_err(SetupError::parse)?;
    if spec.version != SUPPORTED_BENCH_VERSION {
        return Err(SetupError::version(spec.version));
    }
    validate(&spec)?;
    Ok(spec)
}

/// Emit YAML (canonical form).
pub fn to_yaml(spec: &BenchSpec) -> Result<String, SetupError> {
    serde_yaml::to_string(spec).map_err(SetupError::parse)
}

/// Validate a bench document (ids, kinds, references).
pub fn validate(spec: &BenchSpec) -> Result<(), SetupError> {
    if spec.metadata.name.trim().is_empty() {
        return Err(SetupError::validation("metadata.name must not be empty"));
    }

    // Identifier uniqueness across objects, rack members and instructions.
    let mut kinds: BTreeMap<String, ObjectKind> = BTreeMap::new();
    let mut claim = |id: &str, kind: ObjectKind| -> Result<(), SetupError> {
        if id.trim().is_empty() {
            return Err(SetupError::validation("object id must not be empty"));
        }
        if kinds.insert(id.to_string(), kind).is_some() {
            return Err(SetupError::validation(format!("duplicate object id: '{}'", id)));
        }
        Ok(())
    };
    for o in &spec.objects {
        claim(&o.id, o.kind)?;
    }
    for r in &spec.racks {
        claim(&r.id, ObjectKind::Rack)?;
        let member = match r.fill {
            RackFill::Vial => ObjectKind::Vial,
            RackFill::PdpTip => ObjectKind::PdpTip,
        };
        for m in r.member_ids() {
            claim(&m, member)?;
        }
    }

    for o in &spec.objects {
        validate_object(o, &kinds).map_err(|e| e.push_context(format!("in object '{}'", o.id)))?;
    }
    for r in &spec.racks {
        if r.capacity == 0 || r.count > r.capacity {
            return Err(SetupError::validation(format!(
                "rack '{}' cannot hold {} items in {} slots",
                r.id, r.count, r.capacity
            )));
        }
        if let Some(p) = &r.placement {
            validate_placement(p, &kinds)
                .map_err(|e| e.push_context(format!("in rack '{}'", r.id)))?;
        }
    }

    // Instructions: unique ids, known devices, backward-only `after`.
    let mut declared: HashSet<&str> = HashSet::new();
    for i in &spec.instructions {
        if i.id.trim().is_empty() {
            return Err(SetupError::validation("instruction id must not be empty"));
        }
        if kinds.contains_key(&i.id) || declared.contains(i.id.as_str()) {
            return Err(SetupError::validation(format!(
                "duplicate identifier: '{}'",
                i.id
            )));
        }
        match kinds.get(&i.device) {
            None => {
                return Err(SetupError::validation(format!(
                    "instruction '{}' targets unknown device '{}'",
                    i.id, i.device
                )))
            }
            Some(k) if !k.is_device() => {
                return Err(SetupError::validation(format!(
                    "instruction '{}' targets '{}', a {} which is not a device",
                    i.id, i.device, k
                )))
            }
            Some(_) => {}
        }
        for p in &i.after {
            if p == &i.id {
                return Err(SetupError::validation(format!(
                    "self-edge is not allowed: '{}' -> '{}'",
                    p, i.id
                )));
            }
            if !declared.contains(p.as_str()) {
                return Err(SetupError::validation(format!(
                    "instruction '{}' comes after '{}', which is not declared before it",
                    i.id, p
                )));
            }
        }
        declared.insert(i.id.as_str());
    }

    for (n, chain) in spec.chains.iter().enumerate() {
        for id in chain {
            if !declared.contains(id.as_str()) {
                return Err(SetupError::validation(format!(
                    "chain #{} references unknown instruction '{}'",
                    n + 1,
                    id
                )));
            }
        }
        for pair in chain.windows(2) {
            if pair[0] == pair[1] {
                return Err(SetupError::validation(format!(
                    "self-edge is not allowed: '{}' -> '{}'",
                    pair[0], pair[1]
                )));
            }
        }
    }

    Ok(())
}

fn validate_object(o: &ObjectSpec, kinds: &BTreeMap<String, ObjectKind>) -> Result<(), SetupError> {
    let shaped = o.capacity.is_some() || o.slots.is_some() || o.accepts.is_some();
    if shaped && !o.kind.is_container() {
        return Err(SetupError::validation(format!(
            "a {} has no slots; drop capacity/slots/accepts",
            o.kind
        )));
    }
    if o.capacity.is_some() && o.slots.is_some() {
        return Err(SetupError::validation(
            "capacity and slots are mutually exclusive",
        ));
    }
    if o.capacity == Some(0) {
        return Err(SetupError::validation("capacity must be at least 1"));
    }
    if let Some(slots) = &o.slots {
        let unique: HashSet<&String> = slots.iter().collect();
        if slots.is_empty() || unique.len() != slots.len() {
            return Err(SetupError::validation(
                "slots must be a non-empty list of distinct keys",
            ));
        }
    }
    if !o.content.is_empty() {
        if !o.kind.is_chemical_container() {
            return Err(SetupError::validation(format!(
                "a {} cannot hold chemicals",
                o.kind
            )));
        }
        if let Some((name, v)) = o.content.iter().find(|(_, v)| !v.is_finite() || **v < 0.0) {
            return Err(SetupError::validation(format!(
                "content '{}' must be a non-negative amount, got {}",
                name, v
            )));
        }
    }
    if let Some(p) = &o.placement {
        if !o.kind.is_containee() {
            return Err(SetupError::validation(format!(
                "a {} cannot be placed inside a container",
                o.kind
            )));
        }
        validate_placement(p, kinds)?;
    }
    Ok(())
}

fn validate_placement(p: &SlotRef, kinds: &BTreeMap<String, ObjectKind>) -> Result<(), SetupError> {
    match kinds.get(&p.container) {
        None => Err(SetupError::validation(format!(
            "placement references unknown container '{}'",
            p.container
        ))),
        Some(k) if !k.is_container() => Err(SetupError::validation(format!(
            "placement target '{}' is a {}, which holds nothing",
            p.container, k
        ))),
        Some(_) => Ok(()),
    }
}

// =============================================================================
// Building
// =============================================================================

fn object_from_spec(o: &ObjectSpec) -> LabObject {
    let mut obj = LabObject::new(o.id.clone(), o.kind);
    if let Some(c) = o.capacity {
        obj = obj.with_capacity(c);
    }
    if let Some(keys) = &o.slots {
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        obj = obj.with_slot_keys(&keys);
    }
    if let Some(accepts) = &o.accepts {
        obj = obj.with_accepts(accepts.clone());
    }
    for (k, v) in &o.attributes {
        obj = obj.with_attribute(k, v.clone());
    }
    if let Some(layout) = o.layout {
        obj = obj.with_layout(layout);
    }
    if !o.content.is_empty() {
        obj = obj.with_content(&o.content);
    }
    obj
}

fn instruction_from_spec(i: &InstructionSpec) -> Instruction {
    let mut ins = Instruction::new(i.device.clone(), i.action.clone())
        .with_id(i.id.clone())
        .with_params(i.params.clone())
        .described(i.description.clone())
        .gated(i.gating);
    for p in &i.after {
        ins = ins.after(p.clone());
    }
    ins
}

/// Build a fresh [`Lab`] from a validated document.
pub fn build(spec: &BenchSpec) -> Result<Lab, SetupError> {
    let mut lab = Lab::with_timings(spec.timings.clone());

    for o in &spec.objects {
        lab.add_object(object_from_spec(o))
            .map_err(|e| SetupError::build(e).push_context(format!("while adding '{}'", o.id)))?;
    }
    for r in &spec.racks {
        let filled = match r.fill {
            RackFill::Vial => rack_with_vials(&mut lab, &r.id, r.capacity, r.count, &r.vial_type),
            RackFill::PdpTip => rack_with_tips(&mut lab, &r.id, r.capacity, r.count),
        };
        filled.map_err(|e| SetupError::build(e).push_context(format!("while filling '{}'", r.id)))?;
    }

    // Second pass: every container exists now.
    let placements = spec
        .objects
        .iter()
        .filter_map(|o| o.placement.as_ref().map(|p| (&o.id, p)))
        .chain(
            spec.racks
                .iter()
                .filter_map(|r| r.placement.as_ref().map(|p| (&r.id, p))),
        );
    for (id, p) in placements {
        lab.move_object(id, &p.container, &p.slot).map_err(|e| {
            SetupError::build(e).push_context(format!(
                "while placing '{}' in '{}'[{}]",
                id, p.container, p.slot
            ))
        })?;
    }

    for i in &spec.instructions {
        lab.add_instruction(instruction_from_spec(i))
            .map_err(|e| SetupError::build(e).push_context(format!("in instruction '{}'", i.id)))?;
    }
    for chain in &spec.chains {
        let ids: Vec<&str> = chain.iter().map(String::as_str).collect();
        lab.chain(&ids)
            .map_err(|e| SetupError::build(e).push_context(format!("in chain {:?}", chain)))?;
    }

    log::info!(
        "bench '{}' built: {} objects, {} instructions",
        spec.metadata.name,
        lab.objects().count(),
        lab.instructions().len()
    );
    Ok(lab)
}

/// Load a document from disk and build it.
pub fn load_lab(path: impl AsRef<Path>) -> Result<Lab, SetupError> {
    let path = path.as_ref();
    let spec = load_yaml(path)?;
    build(&spec).map_err(|e| e.push_context(format!("in file: {}", path.display())))
}

/// Every object identifier the document declares, rack members included.
pub fn declared_ids(spec: &BenchSpec) -> Vec<Identifier> {
    let mut ids: Vec<Identifier> = spec.objects.iter().map(|o| o.id.clone()).collect();
    for r in &spec.racks {
        ids.push(r.id.clone());
        ids.extend(r.member_ids());
    }
    ids
}
