// src/lib.rs
//
// =============================================================================
// LABTWIN: LIBRARY ROOT
// =============================================================================
//
// This file declares the module tree and exports public types.

// 1. Declare Modules
pub mod action;
pub mod chemistry;
pub mod containment;
pub mod core;
pub mod devices;
pub mod error;
pub mod instruction;
pub mod lab;
pub mod precedence;

pub mod setup;

// 2. Re-exports (The Public API)
// These allow `use labtwin::Lab` or `use labtwin::Instruction` downstream.

pub use action::{ActOutcome, ActionParams, ActorType, Projection, ResourceClaim};
pub use chemistry::ChemicalContent;
pub use containment::{SlotRef, SlotTable, SINGLE_SLOT};
pub use core::{Identifier, LabObject, Layout, ObjectKind};
pub use devices::ActionTimings;
pub use error::{
    ActionError, ContainmentError, ContentError, LabError, PostActError, PreActError,
    RegistryError, TransitionError,
};
pub use instruction::{path_graph, Instruction, InstructionStatus, PrecedingType};
pub use lab::Lab;
