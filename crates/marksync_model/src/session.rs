//! Session context passed to every engine entry point.

/// Stable identifier of the authenticated user.
pub type UserId = String;

/// Canonical id of the device row that originated a change.
pub type DeviceId = u64;

/// The identity under which translation, download, and dispatcher calls
/// run. Passed explicitly; the engine keeps no ambient current-user
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The authenticated user.
    pub user: UserId,
    /// The originating device.
    pub device: DeviceId,
}

impl Session {
    /// Creates a session.
    pub fn new(user: impl Into<UserId>, device: DeviceId) -> Self {
        Self {
            user: user.into(),
            device,
        }
    }
}
