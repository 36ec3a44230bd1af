// src/devices/stations.rs
//
// =============================================================================
// LABTWIN: DECK STATIONS (v 0.3 )
// =============================================================================
//
// Deck slots are devices too: heating, stirring and settling are all modelled
// as a timed `wait` that locks everything sitting on the slot.

use super::{precondition, DUMMY};
use crate::action::{ActionContext, ActionSpec, Params, Projection};
use crate::error::{PostActError, PreActError};
use crate::lab::Lab;

pub static SLOT_ACTIONS: &[ActionSpec] = &[
    DUMMY,
    ActionSpec {
        name: "wait",
        summary: "hold everything on the slot for `wait_time`",
        proj: wait_proj,
        pre: wait_pre,
        post: wait_post,
    },
];

/// Checked by both `proj` and `pre`.
fn wait_time(ctx: &ActionContext<'_>) -> Result<f64, PreActError> {
    let wait_time = ctx.params.f64("wait_time")?;
    if !wait_time.is_finite() || wait_time < 0.0 {
        return Err(precondition(format!(
            "wait_time must be a non-negative number, got {}",
            wait_time
        )));
    }
    Ok(wait_time)
}

fn wait_proj(ctx: &ActionContext<'_>) -> Result<Projection, PreActError> {
    Ok(Projection::new(wait_time(ctx)?).involve_contents(ctx.lab, ctx.actor.identifier())?)
}

fn wait_pre(ctx: &ActionContext<'_>) -> Result<(), PreActError> {
    wait_time(ctx).map(|_| ())
}

fn wait_post(_: &mut Lab, _: &str, _: Params<'_>) -> Result<(), PostActError> {
    Ok(())
}
