//! Route gating for the portal screens.
//!
//! Consumers ask `check` before showing a screen and `nav_entries` for the navbar.
//! Both treat an initializing session as pending, never as logged out.

use crate::session::Session;
use crate::token::Role;

/// Who may open a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Public,
    /// Any authenticated user
    Any,
    Only(Role),
}

/// Gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Session not yet restored; show a neutral placeholder
    Pending,
    Allow,
    RedirectToLogin,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Announcements,
    Courses,
    Assignments,
    Resources,
    Appointments,
    Queries,
    PeerQa,
    Feedback,
    Profile,
    LecturerDashboard,
    StudentDashboard,
}

impl Route {
    pub const ALL: [Route; 13] = [
        Route::Home,
        Route::Login,
        Route::Announcements,
        Route::Courses,
        Route::Assignments,
        Route::Resources,
        Route::Appointments,
        Route::Queries,
        Route::PeerQa,
        Route::Feedback,
        Route::Profile,
        Route::LecturerDashboard,
        Route::StudentDashboard,
    ];

    pub fn audience(&self) -> Audience {
        match self {
            Route::Home | Route::Login => Audience::Public,
            Route::Announcements
            | Route::Courses
            | Route::Assignments
            | Route::Resources
            | Route::Appointments
            | Route::Queries
            | Route::Profile => Audience::Any,
            Route::PeerQa | Route::Feedback | Route::StudentDashboard => {
                Audience::Only(Role::Student)
            }
            Route::LecturerDashboard => Audience::Only(Role::Lecturer),
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Announcements => "/announcements",
            Route::Courses => "/courses",
            Route::Assignments => "/assignments",
            Route::Resources => "/resources",
            Route::Appointments => "/appointments",
            Route::Queries => "/queries",
            Route::PeerQa => "/peer-qa",
            Route::Feedback => "/feedback",
            Route::Profile => "/profile",
            Route::LecturerDashboard => "/lecturer",
            Route::StudentDashboard => "/student",
        }
    }

    /// Look up a route by path, with or without the leading slash
    pub fn from_path(s: &str) -> Option<Self> {
        let s = s.trim();
        let wanted = if s.starts_with('/') {
            s.to_lowercase()
        } else {
            format!("/{}", s.to_lowercase())
        };
        Self::ALL.into_iter().find(|r| r.path() == wanted)
    }
}

/// Decide whether the session may open `route`
pub fn check(session: &Session, route: Route) -> Access {
    if session.is_initializing() {
        return Access::Pending;
    }
    match route.audience() {
        Audience::Public => Access::Allow,
        _ if !session.is_authenticated() => Access::RedirectToLogin,
        Audience::Any => Access::Allow,
        Audience::Only(role) if session.has_role(role) => Access::Allow,
        Audience::Only(_) => Access::Forbidden,
    }
}

/// Navbar entries visible to the session. Empty while initializing.
pub fn nav_entries(session: &Session) -> Vec<Route> {
    if session.is_initializing() {
        return Vec::new();
    }
    Route::ALL
        .into_iter()
        .filter(|r| match r {
            // Login only makes sense when logged out
            Route::Login => !session.is_authenticated(),
            _ => check(session, *r) == Access::Allow,
        })
        .collect()
}
