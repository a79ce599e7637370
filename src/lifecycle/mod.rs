//! Lifecycle management for long-lived navigation services
//!
//! A node is configured once, then activated and deactivated around the
//! mission, and cleaned up at the end:
//!
//! ```text
//! Unconfigured --configure--> Inactive --activate--> Active
//!      ^                        |   ^                  |
//!      +--------cleanup---------+   +---deactivate-----+
//! ```

use crate::error::{NavError, Result};
use std::any::Any;
use std::fmt;

/// Trait for components that follow a lifecycle pattern
pub trait LifecycleNode: Send {
    fn on_configure(&mut self) -> Result<()>;

    /// Start background work
    fn on_activate(&mut self) -> Result<()>;

    /// Stop background work; the node can be activated again
    fn on_deactivate(&mut self) -> Result<()>;

    fn on_cleanup(&mut self) -> Result<()>;

    /// Name used in logs
    fn name(&self) -> &str;

    /// Convert to Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// State of a lifecycle node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Inactive,
    Active,
}

impl State {
    /// Whether a node may move from `self` to `to`
    pub fn can_transition_to(self, to: State) -> bool {
        matches!(
            (self, to),
            (State::Unconfigured, State::Inactive)
                | (State::Inactive, State::Active)
                | (State::Active, State::Inactive)
                | (State::Inactive, State::Unconfigured)
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Unconfigured => "unconfigured",
            State::Inactive => "inactive",
            State::Active => "active",
        };
        f.write_str(name)
    }
}

/// Name and state bookkeeping shared by lifecycle nodes
#[derive(Debug)]
pub struct LifecycleNodeBase {
    pub name: String,
    state: State,
}

impl LifecycleNodeBase {
    pub fn new(name: &str) -> Self {
        LifecycleNodeBase {
            name: name.to_string(),
            state: State::Unconfigured,
        }
    }

    pub fn get_state(&self) -> State {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Move to `to`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, to: State) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(NavError::Lifecycle(format!(
                "{} cannot go from {} to {}",
                self.name, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_is_allowed() {
        let mut base = LifecycleNodeBase::new("node");
        let cycle = [
            State::Inactive,
            State::Active,
            State::Inactive,
            State::Active,
            State::Inactive,
            State::Unconfigured,
        ];
        for to in cycle {
            base.transition(to).unwrap();
        }
        assert_eq!(base.get_state(), State::Unconfigured);
    }

    #[test]
    fn skipping_configure_is_rejected() {
        let mut base = LifecycleNodeBase::new("node");
        let err = base.transition(State::Active).unwrap_err();
        assert!(matches!(err, NavError::Lifecycle(_)));
        assert_eq!(base.get_state(), State::Unconfigured);

        base.transition(State::Inactive).unwrap();
        base.transition(State::Active).unwrap();
        assert!(base.is_active());
        assert!(base.transition(State::Unconfigured).is_err());
    }
}
