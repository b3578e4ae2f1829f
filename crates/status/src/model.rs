//! The deployment status state machine.

use slipway_protocol::{DeploymentStatus, Event, ViewMode};

/// Result of feeding a status into the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The model moved forward.
    Advanced {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },
    /// The model was already in that state.
    Unchanged,
    /// The status would move the model backwards or out of a terminal state.
    Ignored {
        current: DeploymentStatus,
        requested: DeploymentStatus,
    },
}

impl Transition {
    /// True when this transition entered a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Transition::Advanced { to, .. } if to.is_terminal())
    }
}

/// Observer-side view of one project's deployment.
///
/// Status only moves forward. `finished` and `failed` are absorbing, so a
/// late or duplicated signal from a slower source can never reopen a
/// completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentModel {
    status: DeploymentStatus,
}

impl Default for DeploymentModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentModel {
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Queued)
    }

    pub fn from_status(status: DeploymentStatus) -> Self {
        Self { status }
    }

    /// Folds every status-bearing event of a replay into a fresh model.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut model = Self::new();
        for status in events.into_iter().filter_map(Event::status) {
            model.apply(status);
        }
        model
    }

    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    pub fn view_mode(&self) -> ViewMode {
        self.status.view_mode()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a reported status.
    pub fn apply(&mut self, status: DeploymentStatus) -> Transition {
        let current = self.status;
        if status == current {
            return Transition::Unchanged;
        }
        if current.is_terminal() || rank(status) < rank(current) {
            return Transition::Ignored {
                current,
                requested: status,
            };
        }

        self.status = status;
        Transition::Advanced {
            from: current,
            to: status,
        }
    }
}

fn rank(status: DeploymentStatus) -> u8 {
    match status {
        DeploymentStatus::Queued => 0,
        DeploymentStatus::Building => 1,
        DeploymentStatus::Finished | DeploymentStatus::Failed => 2,
    }
}
