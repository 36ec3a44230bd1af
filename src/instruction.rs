// src/instruction.rs
//
// =============================================================================
// LABTWIN: INSTRUCTIONS (v 0.3 )
// =============================================================================
//
// A scheduled request for one action on one device.
//
// Lifecycle:
//   Created -> Eligible -> Reserved -> Active -> Committed
//                                  \         \-> Failed (post failed)
//                                   \-> Failed (pre failed)
//
// Committed and Failed are terminal. Once committed an instruction is kept
// for audit but never re-executed.

use crate::action::{ActionParams, ResourceClaim};
use crate::core::{new_identifier, Identifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

// ============================================================================
// 1. GATING & STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrecedingType {
    /// Every predecessor must have committed.
    #[default]
    #[serde(rename = "ALL", alias = "all")]
    All,
    /// At least one predecessor must have committed.
    #[serde(rename = "ANY", alias = "any")]
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionStatus {
    Created,
    Eligible,
    Reserved,
    Active,
    Committed,
    Failed,
}

impl InstructionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstructionStatus::Committed | InstructionStatus::Failed)
    }

    /// Reserved or Active: the device is occupied.
    pub fn is_in_flight(self) -> bool {
        matches!(self, InstructionStatus::Reserved | InstructionStatus::Active)
    }
}

// ============================================================================
// 2. THE INSTRUCTION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub(crate) id: Identifier,
    pub(crate) device: Identifier,
    pub(crate) action_name: String,
    pub(crate) action_parameters: ActionParams,
    pub(crate) description: String,
    pub(crate) preceding_type: PrecedingType,
    pub(crate) preceding_instructions: BTreeSet<Identifier>,

    // --- Lifecycle (owned by the Lab) ---
    pub(crate) status: InstructionStatus,
    pub(crate) sequence: u64,
    pub(crate) claim: Option<ResourceClaim>,
    pub(crate) failure: Option<String>,
}

impl Instruction {
    pub fn new(device: impl Into<Identifier>, action_name: impl Into<String>) -> Self {
        Self {
            id: new_identifier("instruction"),
            device: device.into(),
            action_name: action_name.into(),
            action_parameters: ActionParams::new(),
            description: String::new(),
            preceding_type: PrecedingType::All,
            preceding_instructions: BTreeSet::new(),
            status: InstructionStatus::Created,
            sequence: 0,
            claim: None,
            failure: None,
        }
    }

    // --- Builders ---

    pub fn with_id(mut self, id: impl Into<Identifier>) -> Self {
        self.id = id.into();
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.action_parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.action_parameters = params;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn after(mut self, predecessor: impl Into<Identifier>) -> Self {
        self.preceding_instructions.insert(predecessor.into());
        self
    }

    pub fn gated(mut self, preceding_type: PrecedingType) -> Self {
        self.preceding_type = preceding_type;
        self
    }

    // --- Accessors ---

    pub fn identifier(&self) -> &str {
        &self.id
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn action_parameters(&self) -> &ActionParams {
        &self.action_parameters
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn preceding_type(&self) -> PrecedingType {
        self.preceding_type
    }

    pub fn preceding_instructions(&self) -> &BTreeSet<Identifier> {
        &self.preceding_instructions
    }

    pub fn status(&self) -> InstructionStatus {
        self.status
    }

    /// Registration order, used for FIFO ordering per device.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn claim(&self) -> Option<&ResourceClaim> {
        self.claim.as_ref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Gating rule over the statuses of this instruction's predecessors.
    pub fn gate_open(&self, predecessors: impl IntoIterator<Item = InstructionStatus>) -> bool {
        let statuses: Vec<InstructionStatus> = predecessors.into_iter().collect();
        if statuses.is_empty() {
            return true;
        }
        let committed = |s: &InstructionStatus| *s == InstructionStatus::Committed;
        match self.preceding_type {
            PrecedingType::All => statuses.iter().all(committed),
            PrecedingType::Any => statuses.iter().any(committed),
        }
    }

    /// True once no future commit can open the gate.
    pub fn gate_dead(&self, predecessors: impl IntoIterator<Item = InstructionStatus>) -> bool {
        let statuses: Vec<InstructionStatus> = predecessors.into_iter().collect();
        if statuses.is_empty() {
            return false;
        }
        let failed = |s: &InstructionStatus| *s == InstructionStatus::Failed;
        match self.preceding_type {
            PrecedingType::All => statuses.iter().any(failed),
            PrecedingType::Any => statuses.iter().all(failed),
        }
    }

    /// Identifier-only view for export layers.
    pub fn as_record(&self) -> InstructionRecord {
        InstructionRecord {
            identifier: self.id.clone(),
            device: self.device.clone(),
            action_name: self.action_name.clone(),
            action_parameters: self.action_parameters.clone(),
            description: self.description.clone(),
            preceding_type: self.preceding_type,
            preceding_instructions: self.preceding_instructions.iter().cloned().collect(),
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub identifier: Identifier,
    pub device: Identifier,
    pub action_name: String,
    pub action_parameters: ActionParams,
    pub description: String,
    pub preceding_type: PrecedingType,
    pub preceding_instructions: Vec<Identifier>,
    pub status: InstructionStatus,
}

// ============================================================================
// 3. BUILDERS
// ============================================================================

/// Chains instructions into a linear path: each one depends on the previous.
pub fn path_graph(instructions: &mut [Instruction]) {
    for i in 1..instructions.len() {
        let prev = instructions[i - 1].id.clone();
        instructions[i].preceding_instructions.insert(prev);
    }
}
