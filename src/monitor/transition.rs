//! Classification of observed statuses and the notification decision for one
//! observation.

/// The only status code treated as "up".
pub const SUCCESS_STATUS: i32 = 200;
/// Stored in place of a status code when the request never got a response.
pub const NETWORK_FAILURE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Unknown,
    Up,
    /// Any non-200 code, including `NETWORK_FAILURE`.
    Down,
}

impl StatusClass {
    pub fn of(status: Option<i32>) -> Self {
        match status {
            None => StatusClass::Unknown,
            Some(SUCCESS_STATUS) => StatusClass::Up,
            Some(_) => StatusClass::Down,
        }
    }
}

/// The kind of notification a decision asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationDecision {
    pub notify_up: bool,
    pub notify_down: bool,
}

impl NotificationDecision {
    pub fn change(&self) -> Option<StatusChange> {
        if self.notify_up {
            Some(StatusChange::Up)
        } else if self.notify_down {
            Some(StatusChange::Down)
        } else {
            None
        }
    }
}

/// Decides which notification, if any, `new_status` calls for.
///
/// Up requires a previous status other than 200 and an unset up latch. Down
/// only requires an unset down latch: a website that is down from its very
/// first check still notifies, and the previous status plays no part.
pub fn decide(
    prev_status: Option<i32>,
    new_status: i32,
    up_latch: bool,
    down_latch: bool,
) -> NotificationDecision {
    let is_up = new_status == SUCCESS_STATUS;
    NotificationDecision {
        notify_up: is_up && prev_status != Some(SUCCESS_STATUS) && !up_latch,
        notify_down: !is_up && !down_latch,
    }
}
