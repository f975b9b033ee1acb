//! Route table.
//!
//! DESIGN
//! ======
//! Every navigable path resolves to a `Page` plus an `Access` class. Public
//! pages (login, registration, verification, pending approval) bypass the
//! gate entirely. Everything else is `Gated` with static requirements fixed
//! when the table is built; nothing here reads the session.
//!
//! Areas are mounted by prefix with a resolver for the remaining segments, so
//! `/dashboard/projects/42` still lands on the projects section. Paths that
//! match nothing are gated with default requirements and render `NotFound`.

#[cfg(test)]
#[path = "routes_test.rs"]
mod routes_test;

use crate::gate::RouteRequirements;

pub const LOGIN_PATH: &str = "/";
pub const REGISTER_PATH: &str = "/register";
pub const VERIFY_EMAIL_PATH: &str = "/verify-email";
pub const PENDING_APPROVAL_PATH: &str = "/pending-approval";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const ADMIN_PATH: &str = "/admin";

// =============================================================================
// PAGES
// =============================================================================

/// Member dashboard sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    Overview,
    Profile,
    Projects,
    Jurisdictions,
    Content,
    Marketing,
    ClientRequirements,
    Settings,
}

impl Section {
    pub const ALL: [Self; 8] = [
        Self::Overview,
        Self::Profile,
        Self::Projects,
        Self::Jurisdictions,
        Self::Content,
        Self::Marketing,
        Self::ClientRequirements,
        Self::Settings,
    ];

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Overview => DASHBOARD_PATH,
            Self::Profile => "/dashboard/profile",
            Self::Projects => "/dashboard/projects",
            Self::Jurisdictions => "/dashboard/jurisdictions",
            Self::Content => "/dashboard/content",
            Self::Marketing => "/dashboard/marketing",
            Self::ClientRequirements => "/dashboard/client-requirements",
            Self::Settings => "/dashboard/settings",
        }
    }

    /// Sidebar label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Overview => "Overview",
            Self::Profile => "Profile",
            Self::Projects => "Projects",
            Self::Jurisdictions => "Jurisdictions",
            Self::Content => "Content",
            Self::Marketing => "Marketing",
            Self::ClientRequirements => "Client Requirements",
            Self::Settings => "Settings",
        }
    }

    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .filter(|s| *s != Self::Overview)
            .find(|s| s.path().rsplit('/').next() == Some(segment))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdminSection {
    Home,
    Users,
}

impl AdminSection {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Home => ADMIN_PATH,
            Self::Users => "/admin/users",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Page {
    Login,
    Register,
    VerifyEmail,
    PendingApproval,
    Dashboard(Section),
    Admin(AdminSection),
    NotFound,
}

/// How a path is guarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Rendered without consulting the gate.
    Public,
    Gated(RouteRequirements),
}

// =============================================================================
// TABLE
// =============================================================================

/// Maps the segments after a mount prefix to a page.
pub type SegmentResolver = fn(&[&str]) -> Option<Page>;

struct Mount {
    prefix: &'static str,
    requirements: RouteRequirements,
    resolve: SegmentResolver,
}

pub struct RouteTable {
    public: Vec<(&'static str, Page)>,
    mounts: Vec<Mount>,
}

impl RouteTable {
    /// Empty table: every path resolves to a gated `NotFound`.
    #[must_use]
    pub fn new() -> Self {
        Self { public: Vec::new(), mounts: Vec::new() }
    }

    /// The portal's routes.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .public(LOGIN_PATH, Page::Login)
            .public(REGISTER_PATH, Page::Register)
            .public(VERIFY_EMAIL_PATH, Page::VerifyEmail)
            .public(PENDING_APPROVAL_PATH, Page::PendingApproval)
            .mount(DASHBOARD_PATH, RouteRequirements::MEMBER_AREA, dashboard_page)
            .mount(ADMIN_PATH, RouteRequirements::ADMIN_AREA, admin_page)
    }

    /// Register an exact public path.
    #[must_use]
    pub fn public(mut self, path: &'static str, page: Page) -> Self {
        self.public.push((path, page));
        self
    }

    /// Register a gated area rooted at `prefix`.
    #[must_use]
    pub fn mount(mut self, prefix: &'static str, requirements: RouteRequirements, resolve: SegmentResolver) -> Self {
        self.mounts.push(Mount { prefix, requirements, resolve });
        self
    }

    /// Resolve `path` (query and fragment ignored) to its page and access class.
    #[must_use]
    pub fn resolve(&self, path: &str) -> (Page, Access) {
        let path = normalize_path(path);

        if let Some((_, page)) = self.public.iter().find(|(p, _)| *p == path) {
            return (*page, Access::Public);
        }

        for mount in &self.mounts {
            let Some(rest) = strip_mount(path, mount.prefix) else {
                continue;
            };
            let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
            let page = (mount.resolve)(&segments).unwrap_or(Page::NotFound);
            return (page, Access::Gated(mount.requirements));
        }

        (Page::NotFound, Access::Gated(RouteRequirements::default()))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = path[..end].trim_end_matches('/');
    if path.is_empty() { LOGIN_PATH } else { path }
}

fn strip_mount<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

fn dashboard_page(segments: &[&str]) -> Option<Page> {
    let section = match segments {
        [] => Section::Overview,
        ["projects", ..] => Section::Projects,
        [segment] => Section::from_segment(segment)?,
        _ => return None,
    };
    Some(Page::Dashboard(section))
}

fn admin_page(segments: &[&str]) -> Option<Page> {
    match segments {
        [] => Some(Page::Admin(AdminSection::Home)),
        ["users"] => Some(Page::Admin(AdminSection::Users)),
        _ => None,
    }
}
