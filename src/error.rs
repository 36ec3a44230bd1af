// src/error.rs
//
// =============================================================================
// LABTWIN: ERROR TAXONOMY (v 0.3 )
// =============================================================================
//
// Every failure the core can report, split by the layer that raises it.
//
// Propagation contract:
// 1. Registry / containment / content errors: recoverable by the caller.
// 2. PreActError: the action never started, nothing changed.
// 3. PostActError: fatal for the owning instruction.
// 4. ActionError::UnknownAction: usage error, not a physical-world error.

use crate::core::{Identifier, ObjectKind};
use crate::instruction::InstructionStatus;
use thiserror::Error;

// ============================================================================
// 1. REGISTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("identifier '{0}' is already registered")]
    DuplicateIdentifier(Identifier),

    #[error("identifier '{0}' is not registered")]
    UnknownIdentifier(Identifier),

    #[error("precedence edge '{from}' -> '{to}' would create a cycle")]
    CyclicPrecedence { from: Identifier, to: Identifier },

    #[error("instruction '{id}' still has successors: {dependents:?}")]
    HasDependents {
        id: Identifier,
        dependents: Vec<Identifier>,
    },

    #[error("object '{id}' is still linked to '{other}' and must be detached first")]
    StillContained { id: Identifier, other: Identifier },

    #[error("object '{id}' is still the device of pending instructions {instructions:?}")]
    StillReferenced {
        id: Identifier,
        instructions: Vec<Identifier>,
    },

    #[error("object '{id}' is a {found:?}, expected {expected}")]
    WrongKind {
        id: Identifier,
        found: ObjectKind,
        expected: &'static str,
    },
}

// ============================================================================
// 2. CONTAINMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContainmentError {
    #[error("slot '{slot}' of '{container}' is occupied by '{occupant}'")]
    SlotOccupied {
        container: Identifier,
        slot: String,
        occupant: Identifier,
    },

    /// The two halves of a containment link disagree. This is corruption,
    /// not a recoverable condition.
    #[error("containment bookkeeping is inconsistent: {0}")]
    ContainmentInconsistent(String),

    #[error("container '{container}' has no slot '{slot}'")]
    UnknownSlot { container: Identifier, slot: String },

    #[error("'{0}' cannot hold other objects")]
    NotAContainer(Identifier),

    #[error("'{0}' cannot be placed inside a container")]
    NotAContainee(Identifier),

    #[error("container '{container}' does not accept {kind:?}")]
    NotAccepted {
        container: Identifier,
        kind: ObjectKind,
    },

    #[error("placing '{containee}' into '{container}' would nest it inside itself")]
    CyclicContainment {
        containee: Identifier,
        container: Identifier,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ============================================================================
// 3. CHEMICAL CONTENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContentError {
    #[error("cannot withdraw {requested} from an empty container")]
    DivisionByZero { requested: f64 },

    #[error("requested {requested} but only {available} is present")]
    InsufficientContent { requested: f64, available: f64 },

    #[error("amount must be a finite, non-negative number (got {0})")]
    InvalidAmount(f64),

    #[error("'{0}' does not hold chemicals")]
    NotAChemicalContainer(Identifier),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ============================================================================
// 4. ACTION PROTOCOL
// ============================================================================

/// A malformed action parameter dictionary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("missing parameter '{0}'")]
    Missing(String),

    #[error("parameter '{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("parameters {0:?} must have the same length")]
    LengthMismatch(Vec<String>),
}

/// Validation failed: the world is not in a state compatible with the action.
/// Nothing was mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreActError {
    #[error(transparent)]
    Parameter(#[from] ParamError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Containment(#[from] ContainmentError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("precondition failed: {0}")]
    Precondition(String),
}

/// Commit failed after the action had begun.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PostActError {
    #[error(transparent)]
    Parameter(#[from] ParamError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Containment(#[from] ContainmentError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("device '{device}' has no action '{action}' (available: {available:?})")]
    UnknownAction {
        device: Identifier,
        action: String,
        available: Vec<&'static str>,
    },

    #[error("'{0}' is not a device")]
    NotADevice(Identifier),

    #[error("instruction '{instruction}' targets '{expected}', not '{found}'")]
    DeviceMismatch {
        instruction: Identifier,
        expected: Identifier,
        found: Identifier,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("validation failed: {0}")]
    Pre(#[from] PreActError),

    #[error("commit failed: {0}")]
    Post(#[from] PostActError),
}

// ============================================================================
// 5. INSTRUCTION LIFECYCLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("instruction '{id}' is {from:?}, cannot move to {to:?}")]
    Illegal {
        id: Identifier,
        from: InstructionStatus,
        to: InstructionStatus,
    },

    #[error("device '{device}' is busy with instruction '{holder}'")]
    DeviceBusy {
        device: Identifier,
        holder: Identifier,
    },
}

// ============================================================================
// 6. UMBRELLA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LabError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Containment(#[from] ContainmentError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl LabError {
    /// True for failures that must halt the owning instruction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LabError::Action(ActionError::Post(_)))
    }
}

impl From<PreActError> for LabError {
    fn from(e: PreActError) -> Self {
        LabError::Action(ActionError::Pre(e))
    }
}

impl From<PostActError> for LabError {
    fn from(e: PostActError) -> Self {
        LabError::Action(ActionError::Post(e))
    }
}
