//! Constraint evaluation — the admission decision for one entry.
//!
//! Pure and stateless: the same constraint set and snapshot always produce
//! the same answer, so the engine can re-evaluate every wake cycle without
//! bookkeeping. Predicates whose signal the host cannot report (currently
//! only idleness) are vacuously satisfied rather than blocking forever.

use cadence_core::env::EnvironmentSnapshot;

use crate::types::ConstraintSet;

/// True when every enforced predicate in `constraints` holds in `env`.
pub fn is_admissible(constraints: &ConstraintSet, env: &EnvironmentSnapshot) -> bool {
    if !constraints.network.satisfied_by(env.network) {
        return false;
    }
    if constraints.battery_not_low && env.battery_low {
        return false;
    }
    if constraints.requires_charging && !env.charging {
        return false;
    }
    if constraints.requires_idle {
        // None means the host has no idle detector — don't enforce.
        if let Some(idle) = env.idle {
            if !idle {
                return false;
            }
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
