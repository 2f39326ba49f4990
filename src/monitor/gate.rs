//! Per-website notification latches.
//!
//! A latch records that the notification for the current up/down class has
//! already been attempted, so repeated observations of the same class do not
//! notify again. Crossing into the other class clears the opposite latch.

use crate::db::entities::website;
use crate::monitor::transition::{decide, NotificationDecision, SUCCESS_STATUS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Latches {
    pub up_notified: bool,
    pub down_notified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub latches: Latches,
    pub decision: NotificationDecision,
}

impl Latches {
    pub fn of(website: &website::Model) -> Self {
        Self {
            up_notified: website.up_notified,
            down_notified: website.down_notified,
        }
    }

    /// Applies one observation: resets latches on a class edge, decides, and
    /// latches whatever the decision asks for. Latching does not depend on
    /// whether delivery is enabled for the website.
    pub fn observe(self, prev_status: Option<i32>, new_status: i32) -> GateOutcome {
        let mut latches = self;
        let was_up = prev_status == Some(SUCCESS_STATUS);
        let is_up = new_status == SUCCESS_STATUS;

        if was_up && !is_up {
            latches.up_notified = false;
        } else if !was_up && is_up {
            latches.down_notified = false;
        }

        let decision = decide(
            prev_status,
            new_status,
            latches.up_notified,
            latches.down_notified,
        );
        if decision.notify_up {
            latches.up_notified = true;
        }
        if decision.notify_down {
            latches.down_notified = true;
        }

        GateOutcome { latches, decision }
    }
}
