use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::controller::{Controller, Services};
use crate::models::PostId;
use crate::view::ViewFactory;

static POST_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/post/(?P<id>[^/]+)(?P<edit>/edit)?/?$").expect("post route pattern")
});

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("no route matches {0}")]
    NoMatch(String),
    #[error("invalid post id: {0}")]
    InvalidId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Post { id: PostId, edit_mode: bool },
}

impl Route {
    pub fn post(id: PostId) -> Self {
        Route::Post {
            id,
            edit_mode: false,
        }
    }

    /// Matches `/post/<id>` and `/post/<id>/edit`.
    pub fn parse(path: &str) -> Result<Self, RouteError> {
        let caps = POST_ROUTE
            .captures(path.trim())
            .ok_or_else(|| RouteError::NoMatch(path.to_string()))?;
        let raw = &caps["id"];
        let id = raw
            .parse::<PostId>()
            .map_err(|_| RouteError::InvalidId(raw.to_string()))?;
        Ok(Route::Post {
            id,
            edit_mode: caps.name("edit").is_some(),
        })
    }

    /// Command-line form: a route path or a bare post id.
    pub fn from_target(target: &str) -> Result<Self, RouteError> {
        let target = target.trim();
        if target.starts_with('/') {
            return Self::parse(target);
        }
        target
            .parse::<PostId>()
            .map(Route::post)
            .map_err(|_| RouteError::InvalidId(target.to_string()))
    }

    pub fn path(&self) -> String {
        match self {
            Route::Post { id, edit_mode: false } => format!("/post/{id}"),
            Route::Post { id, edit_mode: true } => format!("/post/{id}/edit"),
        }
    }
}

/// Owns the active controller. Entering a route drops the previous
/// controller, which detaches its channel; completions still running for it
/// land nowhere.
pub struct Router<F: ViewFactory + Clone> {
    services: Services,
    factory: F,
    current: Option<(Route, Controller<F>)>,
}

impl<F: ViewFactory + Clone> Router<F> {
    pub fn new(services: Services, factory: F) -> Self {
        Self {
            services,
            factory,
            current: None,
        }
    }

    pub fn enter(&mut self, route: Route) -> &mut Controller<F> {
        if let Some((previous, _)) = self.current.take() {
            info!(from = %previous.path(), to = %route.path(), "navigating");
        }
        let Route::Post { id, edit_mode } = route;
        let controller = Controller::new(id, edit_mode, self.services.clone(), self.factory.clone());
        &mut self.current.insert((route, controller)).1
    }

    pub fn route(&self) -> Option<Route> {
        self.current.as_ref().map(|(route, _)| *route)
    }

    pub fn controller(&self) -> Option<&Controller<F>> {
        self.current.as_ref().map(|(_, controller)| controller)
    }

    pub fn controller_mut(&mut self) -> Option<&mut Controller<F>> {
        self.current.as_mut().map(|(_, controller)| controller)
    }
}
