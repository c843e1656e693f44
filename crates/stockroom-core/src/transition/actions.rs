//! Handlers for the named actions a transition runs.

use super::Transition;
use crate::model::UserId;
use crate::model::asset::Asset;
use std::collections::BTreeMap;
use std::fmt;

/// What a handler sees for one asset.
pub struct ActionContext<'a> {
    pub asset: &'a mut Asset,
    pub transition: &'a Transition,
    /// User who triggered the transition.
    pub logged_user: UserId,
    /// User the transition acts on behalf of.
    pub affected_user: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("no handler registered for action '{0}'")]
    Unregistered(String),

    #[error("{0}")]
    Failed(String),
}

/// A transition action handler.
///
/// Handlers mutate `ctx.asset` in place; the engine saves the asset if it
/// changed.
pub trait Action {
    /// # Errors
    ///
    /// Returns [`ActionError`] to abort the rest of the transition.
    fn run(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError>;
}

impl<F> Action for F
where
    F: Fn(&mut ActionContext<'_>) -> Result<(), ActionError>,
{
    fn run(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        self(ctx)
    }
}

struct AssignUser;

impl Action for AssignUser {
    fn run(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        ctx.asset.user_id = Some(ctx.affected_user);
        Ok(())
    }
}

struct UnassignUser;

impl Action for UnassignUser {
    fn run(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        ctx.asset.user_id = None;
        Ok(())
    }
}

struct AssignOwner;

impl Action for AssignOwner {
    fn run(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        ctx.asset.owner_id = Some(ctx.affected_user);
        Ok(())
    }
}

struct UnassignOwner;

impl Action for UnassignOwner {
    fn run(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        ctx.asset.owner_id = None;
        Ok(())
    }
}

/// Action names understood out of the box.
pub const BUILTIN_ACTIONS: [&str; 4] = ["assign_user", "unassign_user", "assign_owner", "unassign_owner"];

/// Maps action names to handlers.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: BTreeMap<String, Box<dyn Action>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the user and owner assignment actions.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("assign_user", AssignUser);
        registry.register("unassign_user", UnassignUser);
        registry.register("assign_owner", AssignOwner);
        registry.register("unassign_owner", UnassignOwner);
        registry
    }

    /// Register `action` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, action: impl Action + 'static) {
        self.handlers.insert(name.into(), Box::new(action));
    }

    /// Register a closure handler under `name`.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut ActionContext<'_>) -> Result<(), ActionError> + 'static,
    {
        self.register(name, handler);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Run the handler registered for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Unregistered`] for unknown names, or whatever
    /// the handler returns.
    pub fn run(&self, name: &str, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        self.handlers
            .get(name)
            .ok_or_else(|| ActionError::Unregistered(name.to_string()))?
            .run(ctx)
    }
}
