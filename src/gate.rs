//! Route access gate.
//!
//! DESIGN
//! ======
//! `decide` is evaluated on every navigation. The checks run in a fixed
//! order and the first match wins; each later rule assumes the earlier ones
//! did not fire:
//!
//! 1. still resolving            -> `Wait`
//! 2. no identity                -> `RedirectToLogin`
//! 3. administrator profile      -> `Allow` (skips every remaining check)
//! 4. address not verified       -> `RedirectToVerify`
//! 5. route is admin-only        -> `RedirectToDashboard`
//! 6. route needs approval and the profile is absent or not approved
//!                               -> `RedirectToPending`
//! 7. otherwise                  -> `Allow`
//!
//! Administrator accounts are provisioned already approved and verified, so
//! rule 3 lets them through even when the identity reports an unverified
//! address.

#[cfg(test)]
#[path = "gate_test.rs"]
mod gate_test;

use crate::session::Session;

/// Outcome of one gate evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Show a loading indicator; neither redirect nor render.
    Wait,
    RedirectToLogin,
    RedirectToVerify,
    RedirectToPending,
    RedirectToDashboard,
    Allow,
}

/// Static access requirements declared by a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RouteRequirements {
    pub requires_approval: bool,
    pub requires_administrator: bool,
}

impl RouteRequirements {
    /// Member dashboard area.
    pub const MEMBER_AREA: Self = Self { requires_approval: true, requires_administrator: false };
    /// Administrative area.
    pub const ADMIN_AREA: Self = Self { requires_approval: true, requires_administrator: true };
    /// Signed-in and verified, nothing else.
    pub const SIGNED_IN: Self = Self { requires_approval: false, requires_administrator: false };
}

/// Decide what `session` may do on a route declaring `requirements`.
#[must_use]
pub fn decide(session: &Session, requirements: RouteRequirements) -> Decision {
    if session.resolving {
        return Decision::Wait;
    }

    let Some(identity) = session.identity.as_ref() else {
        return Decision::RedirectToLogin;
    };

    if session.profile.is_some_and(|p| p.is_administrator()) {
        return Decision::Allow;
    }

    if !identity.email_verified {
        return Decision::RedirectToVerify;
    }

    if requirements.requires_administrator {
        return Decision::RedirectToDashboard;
    }

    if requirements.requires_approval && !session.profile.is_some_and(|p| p.is_approved()) {
        return Decision::RedirectToPending;
    }

    Decision::Allow
}
