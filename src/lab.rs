// src/lab.rs
//
// =============================================================================
// LABTWIN: THE LAB REGISTRY (v 0.3 )
// =============================================================================
//
// The single source of truth for a simulated benchtop.
//
// Responsibilities:
// 1. Own every LabObject and Instruction by identifier (no globals: callers
//    create, pass and reset the registry explicitly).
// 2. Keep the precedence graph acyclic.
// 3. Drive the instruction state machine for an external scheduler:
//    refresh_eligibility -> reserve -> start (pre) -> finish (post).
// 4. Snapshot/restore objects so commits are all-or-nothing.
//
// The Lab never advances time. It answers "what would happen" (project,
// validate) and "make it happen" (finish).

use crate::action::{ActionParams, ResourceClaim};
use crate::core::{Identifier, LabObject, ObjectKind};
use crate::devices::ActionTimings;
use crate::error::{LabError, RegistryError, TransitionError};
use crate::instruction::{Instruction, InstructionRecord, InstructionStatus};
use crate::precedence::PrecedenceGraph;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// 1. DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Lab {
    pub(crate) objects: BTreeMap<Identifier, LabObject>,
    instructions: BTreeMap<Identifier, Instruction>,
    precedence: PrecedenceGraph,
    timings: ActionTimings,
    next_sequence: u64,
}

/// Saved copies of a set of objects. `None` marks an id that did not exist,
/// so restoring removes anything created since.
#[derive(Debug, Clone)]
pub(crate) struct ObjectSnapshot(Vec<(Identifier, Option<LabObject>)>);

impl Lab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timings(timings: ActionTimings) -> Self {
        Self {
            timings,
            ..Self::default()
        }
    }

    pub fn timings(&self) -> &ActionTimings {
        &self.timings
    }

    pub fn set_timings(&mut self, timings: ActionTimings) {
        self.timings = timings;
    }

    /// Drops every object and instruction. Timings are kept.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.instructions.clear();
        self.precedence = PrecedenceGraph::new();
        self.next_sequence = 0;
        log::debug!("lab reset");
    }

    fn check_fresh(&self, id: &str) -> Result<(), RegistryError> {
        if self.objects.contains_key(id) || self.instructions.contains_key(id) {
            return Err(RegistryError::DuplicateIdentifier(id.to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // 2. OBJECTS
    // ========================================================================

    /// Registers a free object. Placement happens afterwards via `move_object`.
    pub fn add_object(&mut self, obj: LabObject) -> Result<(), RegistryError> {
        self.check_fresh(obj.identifier())?;
        log::debug!("registered {} ({})", obj.identifier(), obj.kind());
        self.objects.insert(obj.identifier().to_string(), obj);
        Ok(())
    }

    /// Unregisters an object. It must hold nothing, be held by nothing and
    /// not be the device of any instruction that can still run.
    pub fn remove_object(&mut self, id: &str) -> Result<LabObject, RegistryError> {
        let obj = self.get(id)?;
        let pending: Vec<Identifier> = self
            .instructions()
            .into_iter()
            .filter(|i| i.device == id && !i.status.is_terminal())
            .map(|i| i.id.clone())
            .collect();
        if !pending.is_empty() {
            return Err(RegistryError::StillReferenced {
                id: id.to_string(),
                instructions: pending,
            });
        }
        if let Some(holder) = obj.contained_by() {
            return Err(RegistryError::StillContained {
                id: id.to_string(),
                other: holder.to_string(),
            });
        }
        if let Some(inner) = obj.slots().and_then(|t| t.contained().next()) {
            return Err(RegistryError::StillContained {
                id: id.to_string(),
                other: inner.clone(),
            });
        }
        let removed = self
            .objects
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.to_string()))?;
        log::debug!("unregistered {}", id);
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Result<&LabObject, RegistryError> {
        self.objects
            .get(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut LabObject, RegistryError> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &LabObject> {
        self.objects.values()
    }

    pub fn objects_of_kind(&self, kind: ObjectKind) -> Vec<&LabObject> {
        self.objects.values().filter(|o| o.kind() == kind).collect()
    }

    /// identifier -> state for every object, in identifier order.
    pub fn state(&self) -> BTreeMap<Identifier, Value> {
        self.objects
            .iter()
            .map(|(id, o)| (id.clone(), o.state()))
            .collect()
    }

    /// SHA-256 over the canonical JSON form of `state()`.
    pub fn state_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (id, state) in self.state() {
            hasher.update(id.as_bytes());
            hasher.update(state.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub(crate) fn snapshot_objects(&self, ids: &BTreeSet<Identifier>) -> ObjectSnapshot {
        ObjectSnapshot(
            ids.iter()
                .map(|id| (id.clone(), self.objects.get(id).cloned()))
                .collect(),
        )
    }

    pub(crate) fn restore_objects(&mut self, snapshot: ObjectSnapshot) {
        for (id, saved) in snapshot.0 {
            match saved {
                Some(obj) => {
                    self.objects.insert(id, obj);
                }
                None => {
                    self.objects.remove(&id);
                }
            }
        }
    }

    // ========================================================================
    // 3. INSTRUCTIONS
    // ========================================================================

    /// Registers an instruction. Its device and predecessors must already be
    /// registered. An instruction with no predecessors is eligible at once.
    pub fn add_instruction(&mut self, mut ins: Instruction) -> Result<Identifier, RegistryError> {
        self.check_fresh(&ins.id)?;
        let device = self.get(&ins.device)?;
        if !device.is_device() {
            return Err(RegistryError::WrongKind {
                id: ins.device.clone(),
                found: device.kind(),
                expected: "a device",
            });
        }
        if let Some(missing) = ins
            .preceding_instructions
            .iter()
            .find(|p| !self.instructions.contains_key(*p))
        {
            return Err(RegistryError::UnknownIdentifier(missing.clone()));
        }

        let id = ins.id.clone();
        self.precedence.add_node(&id);
        for pred in &ins.preceding_instructions {
            self.precedence.add_edge(pred, &id)?;
        }
        ins.status = InstructionStatus::Created;
        ins.sequence = self.next_sequence;
        ins.claim = None;
        ins.failure = None;
        self.next_sequence += 1;
        log::debug!("instruction {} -> {}::{}", id, ins.device, ins.action_name);
        self.instructions.insert(id.clone(), ins);
        self.refresh_one(&id);
        Ok(id)
    }

    /// Removes an instruction that nothing depends on.
    pub fn remove_instruction(&mut self, id: &str) -> Result<Instruction, RegistryError> {
        if !self.instructions.contains_key(id) {
            return Err(RegistryError::UnknownIdentifier(id.to_string()));
        }
        let dependents = self.precedence.successors(id);
        if !dependents.is_empty() {
            return Err(RegistryError::HasDependents {
                id: id.to_string(),
                dependents,
            });
        }
        self.precedence.remove_node(id);
        self.instructions
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.to_string()))
    }

    /// Adds `pred -> succ`. The successor must not have been reserved yet.
    pub fn add_precedence(&mut self, pred: &str, succ: &str) -> Result<(), LabError> {
        self.instruction(pred)?;
        let status = self.instruction(succ)?.status;
        if !matches!(
            status,
            InstructionStatus::Created | InstructionStatus::Eligible
        ) {
            return Err(TransitionError::Illegal {
                id: succ.to_string(),
                from: status,
                to: InstructionStatus::Created,
            }
            .into());
        }
        self.precedence.add_edge(pred, succ)?;
        if let Some(ins) = self.instructions.get_mut(succ) {
            ins.preceding_instructions.insert(pred.to_string());
            // Eligibility is derived from the predecessors, so recompute it.
            ins.status = InstructionStatus::Created;
        }
        self.refresh_one(succ);
        Ok(())
    }

    /// Links `ids` into a linear path.
    pub fn chain(&mut self, ids: &[&str]) -> Result<(), LabError> {
        for pair in ids.windows(2) {
            self.add_precedence(pair[0], pair[1])?;
        }
        Ok(())
    }

    pub fn instruction(&self, id: &str) -> Result<&Instruction, RegistryError> {
        self.instructions
            .get(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.to_string()))
    }

    pub fn contains_instruction(&self, id: &str) -> bool {
        self.instructions.contains_key(id)
    }

    /// All instructions in registration order.
    pub fn instructions(&self) -> Vec<&Instruction> {
        let mut all: Vec<&Instruction> = self.instructions.values().collect();
        all.sort_by_key(|i| i.sequence);
        all
    }

    pub fn instructions_with_status(&self, status: InstructionStatus) -> Vec<&Instruction> {
        self.instructions()
            .into_iter()
            .filter(|i| i.status == status)
            .collect()
    }

    pub fn instruction_records(&self) -> Vec<InstructionRecord> {
        self.instructions().iter().map(|i| i.as_record()).collect()
    }

    pub fn precedence(&self) -> &PrecedenceGraph {
        &self.precedence
    }

    /// Graphviz DOT of the precedence graph, labelled "id: description".
    pub fn instructions_to_dot(&self) -> String {
        self.precedence.to_dot(|id| match self.instructions.get(id) {
            Some(ins) if !ins.description.is_empty() => format!("{}: {}", id, ins.description),
            _ => id.to_string(),
        })
    }

    // ========================================================================
    // 4. SCHEDULER INTERFACE
    // ========================================================================

    fn predecessor_statuses(&self, ins: &Instruction) -> Vec<InstructionStatus> {
        ins.preceding_instructions
            .iter()
            .filter_map(|p| self.instructions.get(p))
            .map(|p| p.status)
            .collect()
    }

    fn refresh_one(&mut self, id: &str) -> bool {
        let open = match self.instructions.get(id) {
            Some(ins) if ins.status == InstructionStatus::Created => {
                ins.gate_open(self.predecessor_statuses(ins))
            }
            _ => false,
        };
        if open {
            if let Some(ins) = self.instructions.get_mut(id) {
                ins.status = InstructionStatus::Eligible;
                log::info!("instruction {} is eligible", id);
            }
        }
        open
    }

    /// Promotes every Created instruction whose gate is open. Returns the
    /// newly eligible ids in registration order.
    pub fn refresh_eligibility(&mut self) -> Vec<Identifier> {
        let created: Vec<Identifier> = self
            .instructions_with_status(InstructionStatus::Created)
            .into_iter()
            .map(|i| i.id.clone())
            .collect();
        created
            .into_iter()
            .filter(|id| self.refresh_one(id))
            .collect()
    }

    /// Eligible instructions in registration (FIFO) order.
    pub fn eligible_instructions(&self) -> Vec<&Instruction> {
        self.instructions_with_status(InstructionStatus::Eligible)
    }

    fn call_of(&self, id: &str) -> Result<(Identifier, String, ActionParams), RegistryError> {
        let ins = self.instruction(id)?;
        Ok((
            ins.device.clone(),
            ins.action_name.clone(),
            ins.action_parameters.clone(),
        ))
    }

    /// Duration and lock set of an instruction's action. Read-only.
    pub fn project(&self, id: &str) -> Result<ResourceClaim, LabError> {
        let ins = self.instruction(id)?;
        let projection =
            self.project_action(&ins.device, &ins.action_name, &ins.action_parameters)?;
        Ok(ResourceClaim::new(&ins.device, &projection))
    }

    /// Runs the `pre` phase without touching the instruction's status.
    pub fn validate(&self, id: &str) -> Result<(), LabError> {
        let ins = self.instruction(id)?;
        self.validate_action(&ins.device, &ins.action_name, &ins.action_parameters)?;
        Ok(())
    }

    fn expect_status(
        &self,
        id: &str,
        expected: InstructionStatus,
        to: InstructionStatus,
    ) -> Result<(), LabError> {
        let from = self.instruction(id)?.status;
        if from != expected {
            return Err(TransitionError::Illegal {
                id: id.to_string(),
                from,
                to,
            }
            .into());
        }
        Ok(())
    }

    fn set_status(&mut self, id: &str, status: InstructionStatus) {
        if let Some(ins) = self.instructions.get_mut(id) {
            ins.status = status;
        }
    }

    fn fail(&mut self, id: &str, reason: String) {
        if let Some(ins) = self.instructions.get_mut(id) {
            ins.status = InstructionStatus::Failed;
            ins.failure = Some(reason);
        }
    }

    /// The in-flight instruction currently holding `device`, if any.
    pub fn device_holder(&self, device: &str) -> Option<&Instruction> {
        self.instructions
            .values()
            .find(|i| i.device == device && i.status.is_in_flight())
    }

    /// In-flight instructions whose claims overlap `claim`.
    pub fn conflicts(&self, claim: &ResourceClaim) -> Vec<Identifier> {
        self.instructions()
            .into_iter()
            .filter(|i| i.status.is_in_flight())
            .filter(|i| i.claim.as_ref().is_some_and(|c| c.overlaps(claim)))
            .map(|i| i.id.clone())
            .collect()
    }

    /// Eligible -> Reserved. Projects and stores the claim. A device holds
    /// at most one in-flight instruction.
    pub fn reserve(&mut self, id: &str) -> Result<ResourceClaim, LabError> {
        self.expect_status(id, InstructionStatus::Eligible, InstructionStatus::Reserved)?;
        let device = self.instruction(id)?.device.clone();
        if let Some(holder) = self.device_holder(&device) {
            return Err(TransitionError::DeviceBusy {
                device,
                holder: holder.id.clone(),
            }
            .into());
        }
        let claim = self.project(id)?;
        if let Some(ins) = self.instructions.get_mut(id) {
            ins.status = InstructionStatus::Reserved;
            ins.claim = Some(claim.clone());
        }
        log::info!(
            "instruction {} reserved {} resources for {:.1}s",
            id,
            claim.resources.len(),
            claim.duration
        );
        Ok(claim)
    }

    /// Reserved -> Active once `pre` passes; Reserved -> Failed otherwise.
    pub fn start(&mut self, id: &str) -> Result<(), LabError> {
        self.expect_status(id, InstructionStatus::Reserved, InstructionStatus::Active)?;
        match self.validate(id) {
            Ok(()) => {
                self.set_status(id, InstructionStatus::Active);
                log::info!("instruction {} is active", id);
                Ok(())
            }
            Err(e) => {
                log::warn!("instruction {} failed validation: {}", id, e);
                self.fail(id, e.to_string());
                Err(e)
            }
        }
    }

    /// Active -> Committed once `post` succeeds; Active -> Failed otherwise.
    /// A commit makes successors eligible where their gate opens.
    pub fn finish(&mut self, id: &str) -> Result<(), LabError> {
        self.expect_status(id, InstructionStatus::Active, InstructionStatus::Committed)?;
        let (device, action, params) = self.call_of(id)?;
        match self.commit_action(&device, &action, &params) {
            Ok(()) => {
                self.set_status(id, InstructionStatus::Committed);
                log::info!("instruction {} committed", id);
                self.refresh_eligibility();
                Ok(())
            }
            Err(e) => {
                log::error!("instruction {} failed to commit: {}", id, e);
                self.fail(id, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Non-terminal instructions that can never become eligible, because a
    /// predecessor failed or is itself halted.
    pub fn halted_instructions(&self) -> Vec<Identifier> {
        let order = self.precedence.topological_order().unwrap_or_default();
        let mut halted: BTreeSet<Identifier> = BTreeSet::new();
        let mut out = Vec::new();
        for id in order {
            let Some(ins) = self.instructions.get(&id) else {
                continue;
            };
            if ins.status.is_terminal() || ins.status.is_in_flight() {
                continue;
            }
            let statuses = ins.preceding_instructions.iter().filter_map(|p| {
                if halted.contains(p) {
                    Some(InstructionStatus::Failed)
                } else {
                    self.instructions.get(p).map(|x| x.status)
                }
            });
            if ins.gate_dead(statuses) {
                halted.insert(id.clone());
                out.push(id);
            }
        }
        out
    }
}
