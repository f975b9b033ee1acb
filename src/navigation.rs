//! Navigation outcomes.
//!
//! SYSTEM CONTEXT
//! ==============
//! Views call `navigate` before rendering anything. It resolves the path
//! against the route table, runs the gate for gated pages, and turns the
//! decision into something a view can act on: a spinner, a page, or a
//! redirect. Login and verify redirects carry the original path in `from` so
//! the view can return there afterwards.

#[cfg(test)]
#[path = "navigation_test.rs"]
mod navigation_test;

use crate::gate::{Decision, decide};
use crate::identity::Identity;
use crate::profile::{AccessProfile, ApprovalStatus};
use crate::routes::{
    ADMIN_PATH, Access, DASHBOARD_PATH, LOGIN_PATH, PENDING_APPROVAL_PATH, Page, RouteTable, VERIFY_EMAIL_PATH,
};
use crate::session::Session;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    /// Session still resolving; show a loading indicator.
    Loading,
    Render(Page),
    Redirect { to: &'static str, from: Option<String> },
}

impl Navigation {
    fn redirect(to: &'static str) -> Self {
        Self::Redirect { to, from: None }
    }

    fn redirect_from(to: &'static str, from: &str) -> Self {
        Self::Redirect { to, from: Some(from.to_owned()) }
    }
}

/// Decide what a visit to `path` shows for `session`.
#[must_use]
pub fn navigate(session: &Session, table: &RouteTable, path: &str) -> Navigation {
    let (page, access) = table.resolve(path);
    let Access::Gated(requirements) = access else {
        return public_page(session, page);
    };

    match decide(session, requirements) {
        Decision::Wait => Navigation::Loading,
        Decision::Allow => Navigation::Render(page),
        Decision::RedirectToLogin => Navigation::redirect_from(LOGIN_PATH, path),
        Decision::RedirectToVerify => Navigation::redirect_from(VERIFY_EMAIL_PATH, path),
        Decision::RedirectToPending => Navigation::redirect(PENDING_APPROVAL_PATH),
        Decision::RedirectToDashboard => Navigation::redirect(DASHBOARD_PATH),
    }
}

/// Public pages skip the gate. The verify page still needs someone to verify,
/// so a resolved signed-out session is sent to login.
fn public_page(session: &Session, page: Page) -> Navigation {
    if page == Page::VerifyEmail && !session.resolving && session.identity.is_none() {
        return Navigation::redirect(LOGIN_PATH);
    }
    Navigation::Render(page)
}

/// Where a successful login lands.
#[must_use]
pub fn landing_path(identity: &Identity, profile: AccessProfile) -> &'static str {
    if profile.is_administrator() {
        ADMIN_PATH
    } else if !identity.email_verified {
        VERIFY_EMAIL_PATH
    } else if !profile.is_approved() {
        PENDING_APPROVAL_PATH
    } else {
        DASHBOARD_PATH
    }
}

/// Where to continue from the verify-email page. Pending or missing profiles
/// wait for review; everyone else goes on and lets the gate sort it out.
#[must_use]
pub fn after_verification_path(profile: Option<AccessProfile>) -> &'static str {
    match profile {
        Some(p) if p.is_administrator() => ADMIN_PATH,
        None | Some(AccessProfile { status: ApprovalStatus::Pending, .. }) => PENDING_APPROVAL_PATH,
        Some(_) => DASHBOARD_PATH,
    }
}
