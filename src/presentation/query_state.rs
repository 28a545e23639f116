//! Resolve raw query status flags into the single state a view renders.
//!
//! Loading flags are checked before data: while any fetch is in flight the
//! view shows the loading state even if stale data is cached.

use std::fmt;

use serde::Serialize;

use crate::cache::QuerySnapshot;

/// Status flags reported for one query key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryFlags {
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_pending: bool,
    pub is_refetching: bool,
    pub is_fetched_after_mount: bool,
}

impl QueryFlags {
    /// Fetch finished, nothing in flight.
    pub const SETTLED: QueryFlags = QueryFlags {
        is_loading: false,
        is_fetching: false,
        is_pending: false,
        is_refetching: false,
        is_fetched_after_mount: true,
    };

    pub fn is_loading_any(&self) -> bool {
        self.is_loading || self.is_fetching || self.is_pending || self.is_refetching
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderState {
    Loading,
    NotFound,
    Ready,
}

impl RenderState {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderState::Loading => "LOADING",
            RenderState::NotFound => "NOT_FOUND",
            RenderState::Ready => "READY",
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn resolve<T>(flags: QueryFlags, data: Option<&T>) -> RenderState {
    if flags.is_loading_any() {
        return RenderState::Loading;
    }
    match data {
        Some(_) => RenderState::Ready,
        None => RenderState::NotFound,
    }
}

/// Borrowed view over a query result that dispatches to one of three renderers.
#[derive(Debug)]
pub struct QueryStateView<'a, T> {
    flags: QueryFlags,
    data: Option<&'a T>,
}

impl<'a, T> QueryStateView<'a, T> {
    pub fn new(flags: QueryFlags, data: Option<&'a T>) -> Self {
        Self { flags, data }
    }

    pub fn from_snapshot(snapshot: &'a QuerySnapshot<T>) -> Self {
        Self::new(snapshot.flags, snapshot.data.as_ref())
    }

    pub fn state(&self) -> RenderState {
        resolve(self.flags, self.data)
    }

    pub fn render<R>(
        self,
        loading: impl FnOnce() -> R,
        not_found: impl FnOnce() -> R,
        ready: impl FnOnce(&'a T) -> R,
    ) -> R {
        match (self.state(), self.data) {
            (RenderState::Ready, Some(data)) => ready(data),
            (RenderState::Loading, _) => loading(),
            _ => not_found(),
        }
    }
}
