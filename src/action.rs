// src/action.rs
//
// =============================================================================
// LABTWIN: DEVICE ACTION PROTOCOL (v 0.3 )
// =============================================================================
//
// The three-phase contract every action implements.
//
// Phases:
// 1. proj  - read-only. Which objects are involved, and for how long.
// 2. pre   - read-only. Is the physical world ready? (PreActError if not)
// 3. post  - side-effecting. Apply the transition atomically.
//
// Dispatch goes through static per-kind tables (`devices::actions_for`),
// built at compile time. Nothing is discovered by name at call time.

use crate::core::{Identifier, LabObject};
use crate::devices;
use crate::error::{ActionError, ParamError, PostActError, PreActError, RegistryError};
use crate::instruction::Instruction;
use crate::lab::Lab;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Static action parameters. Objects are referenced by identifier.
pub type ActionParams = Map<String, Value>;

// ============================================================================
// 1. PHASES & PROJECTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Proj,
    Pre,
    Post,
}

/// What an action would touch (besides its actor) and for how long.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub involved: Vec<Identifier>,
    pub duration: f64,
}

impl Projection {
    pub fn new(duration: f64) -> Self {
        Self {
            involved: Vec::new(),
            duration,
        }
    }

    pub fn involve(mut self, id: &str) -> Self {
        self.involved.push(id.to_string());
        self
    }

    /// Involves `id` and everything nested inside it.
    pub fn involve_closure(mut self, lab: &Lab, id: &str) -> Result<Self, RegistryError> {
        self.involved.push(id.to_string());
        self.involved.extend(lab.resource_closure(id)?);
        Ok(self)
    }

    /// Involves only what is nested inside `id`.
    pub fn involve_contents(mut self, lab: &Lab, id: &str) -> Result<Self, RegistryError> {
        self.involved.extend(lab.resource_closure(id)?);
        Ok(self)
    }
}

/// The lock set handed to the scheduler: the actor plus every involved object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceClaim {
    pub duration: f64,
    pub resources: BTreeSet<Identifier>,
}

impl ResourceClaim {
    pub fn new(actor: &str, projection: &Projection) -> Self {
        let mut resources: BTreeSet<Identifier> = projection.involved.iter().cloned().collect();
        resources.insert(actor.to_string());
        Self {
            duration: projection.duration,
            resources,
        }
    }

    /// Two claims may run concurrently only if this is false.
    pub fn overlaps(&self, other: &ResourceClaim) -> bool {
        !self.resources.is_disjoint(&other.resources)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActOutcome {
    Projected(Projection),
    Validated,
    Committed,
}

// ============================================================================
// 2. PARAMETER ACCESS
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Params<'a>(&'a ActionParams);

impl<'a> Params<'a> {
    pub fn new(map: &'a ActionParams) -> Self {
        Self(map)
    }

    pub fn raw(&self) -> &'a ActionParams {
        self.0
    }

    fn value(&self, key: &str) -> Result<&'a Value, ParamError> {
        self.0
            .get(key)
            .ok_or_else(|| ParamError::Missing(key.to_string()))
    }

    /// An object reference (identifier string).
    pub fn object(&self, key: &str) -> Result<&'a str, ParamError> {
        self.value(key)?
            .as_str()
            .ok_or_else(|| ParamError::WrongType {
                key: key.to_string(),
                expected: "an object identifier",
            })
    }

    pub fn objects(&self, key: &str) -> Result<Vec<&'a str>, ParamError> {
        let wrong = || ParamError::WrongType {
            key: key.to_string(),
            expected: "a list of object identifiers",
        };
        self.value(key)?
            .as_array()
            .ok_or_else(wrong)?
            .iter()
            .map(|v| v.as_str().ok_or_else(wrong))
            .collect()
    }

    pub fn f64(&self, key: &str) -> Result<f64, ParamError> {
        self.value(key)?
            .as_f64()
            .ok_or_else(|| ParamError::WrongType {
                key: key.to_string(),
                expected: "a number",
            })
    }

    pub fn f64s(&self, key: &str) -> Result<Vec<f64>, ParamError> {
        let wrong = || ParamError::WrongType {
            key: key.to_string(),
            expected: "a list of numbers",
        };
        self.value(key)?
            .as_array()
            .ok_or_else(wrong)?
            .iter()
            .map(|v| v.as_f64().ok_or_else(wrong))
            .collect()
    }

    /// Slot keys; numbers are accepted and rendered as strings.
    pub fn slot_keys(&self, key: &str) -> Result<Vec<String>, ParamError> {
        let wrong = || ParamError::WrongType {
            key: key.to_string(),
            expected: "a list of slot keys",
        };
        self.value(key)?
            .as_array()
            .ok_or_else(wrong)?
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(wrong()),
            })
            .collect()
    }

    pub fn opt_str(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// A `{chemical: amount}` mapping.
    pub fn chemicals(&self, key: &str) -> Result<BTreeMap<String, f64>, ParamError> {
        let wrong = || ParamError::WrongType {
            key: key.to_string(),
            expected: "a mapping of chemical name to amount",
        };
        self.value(key)?
            .as_object()
            .ok_or_else(wrong)?
            .iter()
            .map(|(k, v)| v.as_f64().map(|a| (k.clone(), a)).ok_or_else(wrong))
            .collect()
    }

    /// Fails unless all listed parameters have equal length.
    pub fn same_length(&self, lens: &[(&str, usize)]) -> Result<(), ParamError> {
        let first = lens.first().map(|(_, l)| *l);
        if lens.iter().any(|(_, l)| Some(*l) != first) {
            return Err(ParamError::LengthMismatch(
                lens.iter().map(|(k, _)| k.to_string()).collect(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// 3. THE STATIC TABLE ENTRY
// ============================================================================

/// Read-only view handed to the `proj` and `pre` phases.
pub struct ActionContext<'a> {
    pub lab: &'a Lab,
    pub actor: &'a LabObject,
    pub params: Params<'a>,
}

pub type ProjFn = fn(&ActionContext<'_>) -> Result<Projection, PreActError>;
pub type PreFn = fn(&ActionContext<'_>) -> Result<(), PreActError>;
pub type PostFn = fn(&mut Lab, &str, Params<'_>) -> Result<(), PostActError>;

pub struct ActionSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub proj: ProjFn,
    pub pre: PreFn,
    pub post: PostFn,
}

impl std::fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSpec")
            .field("name", &self.name)
            .field("summary", &self.summary)
            .finish()
    }
}

// ============================================================================
// 4. DISPATCH
// ============================================================================

impl Lab {
    /// Sorted names of every action `device` implements.
    pub fn action_names(&self, device: &str) -> Result<Vec<&'static str>, ActionError> {
        let actor = self.device(device)?;
        let mut names: Vec<&'static str> = devices::actions_for(actor.kind())
            .iter()
            .map(|a| a.name)
            .collect();
        names.sort_unstable();
        Ok(names)
    }

    fn device(&self, device: &str) -> Result<&LabObject, ActionError> {
        let actor = self.get(device)?;
        if !actor.is_device() {
            return Err(ActionError::NotADevice(device.to_string()));
        }
        Ok(actor)
    }

    fn action_spec(
        &self,
        device: &str,
        action: &str,
    ) -> Result<(&LabObject, &'static ActionSpec), ActionError> {
        let actor = self.device(device)?;
        let table = devices::actions_for(actor.kind());
        let spec = table
            .iter()
            .find(|a| a.name == action)
            .ok_or_else(|| {
                let mut available: Vec<&'static str> = table.iter().map(|a| a.name).collect();
                available.sort_unstable();
                ActionError::UnknownAction {
                    device: device.to_string(),
                    action: action.to_string(),
                    available,
                }
            })?;
        Ok((actor, spec))
    }

    pub fn project_action(
        &self,
        device: &str,
        action: &str,
        params: &ActionParams,
    ) -> Result<Projection, ActionError> {
        let (actor, spec) = self.action_spec(device, action)?;
        let ctx = ActionContext {
            lab: self,
            actor,
            params: Params::new(params),
        };
        let projection = (spec.proj)(&ctx)?;
        log::debug!(
            "proj {}::{} -> {} involved, {:.1}s",
            device,
            action,
            projection.involved.len(),
            projection.duration
        );
        Ok(projection)
    }

    pub fn validate_action(
        &self,
        device: &str,
        action: &str,
        params: &ActionParams,
    ) -> Result<(), ActionError> {
        let (actor, spec) = self.action_spec(device, action)?;
        let ctx = ActionContext {
            lab: self,
            actor,
            params: Params::new(params),
        };
        (spec.pre)(&ctx)?;
        Ok(())
    }

    /// Runs the `post` phase. On failure every object in the projected
    /// resource set is restored, so no half-applied transition survives.
    pub fn commit_action(
        &mut self,
        device: &str,
        action: &str,
        params: &ActionParams,
    ) -> Result<(), ActionError> {
        let (_, spec) = self.action_spec(device, action)?;
        let claim = self
            .project_action(device, action, params)
            .map(|p| ResourceClaim::new(device, &p))
            .map_err(|e| {
                ActionError::Post(PostActError::IllegalTransition(format!(
                    "cannot determine the objects touched by {}::{}: {}",
                    device, action, e
                )))
            })?;

        let snapshot = self.snapshot_objects(&claim.resources);
        match (spec.post)(self, device, Params::new(params)) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.restore_objects(snapshot);
                log::warn!("rolled back {}::{} after: {}", device, action, e);
                Err(ActionError::Post(e))
            }
        }
    }

    /// Generic entry point: run one phase of `action` on `device`.
    pub fn act(
        &mut self,
        device: &str,
        action: &str,
        actor_type: ActorType,
        params: &ActionParams,
    ) -> Result<ActOutcome, ActionError> {
        match actor_type {
            ActorType::Proj => self
                .project_action(device, action, params)
                .map(ActOutcome::Projected),
            ActorType::Pre => self
                .validate_action(device, action, params)
                .map(|_| ActOutcome::Validated),
            ActorType::Post => self
                .commit_action(device, action, params)
                .map(|_| ActOutcome::Committed),
        }
    }

    /// Like [`Lab::act`], reading action and parameters off `instruction`.
    /// The instruction must target `device`.
    pub fn act_by_instruction(
        &mut self,
        device: &str,
        instruction: &Instruction,
        actor_type: ActorType,
    ) -> Result<ActOutcome, ActionError> {
        if instruction.device() != device {
            return Err(ActionError::DeviceMismatch {
                instruction: instruction.identifier().to_string(),
                expected: instruction.device().to_string(),
                found: device.to_string(),
            });
        }
        self.act(
            device,
            instruction.action_name(),
            actor_type,
            instruction.action_parameters(),
        )
    }
}
