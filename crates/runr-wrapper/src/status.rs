use std::fmt;

use crate::proto::WireStatus;

/// Lifecycle of the wrapped process.
///
/// Variants are ordered; the wrapper never moves to an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Status {
    #[default]
    Unknown,
    Running,
    InShutdown,
    Stopped,
}

impl Status {
    /// Lowercase name, as used in logs.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Running => "running",
            Status::InShutdown => "in_shutdown",
            Status::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Status> for WireStatus {
    fn from(s: Status) -> Self {
        match s {
            Status::Unknown => WireStatus::Unknown,
            Status::Running => WireStatus::Running,
            Status::InShutdown => WireStatus::InShutdown,
            Status::Stopped => WireStatus::Stopped,
        }
    }
}

impl From<WireStatus> for Status {
    fn from(s: WireStatus) -> Self {
        match s {
            WireStatus::Unknown => Status::Unknown,
            WireStatus::Running => Status::Running,
            WireStatus::InShutdown => Status::InShutdown,
            WireStatus::Stopped => Status::Stopped,
        }
    }
}

/// Decode a wire value; unknown numbers read as [`Status::Unknown`].
pub fn status_from_wire(raw: i32) -> Status {
    WireStatus::try_from(raw).map(Status::from).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(WireStatus::from(Status::Unknown) as i32, 0);
        assert_eq!(WireStatus::from(Status::Running) as i32, 1);
        assert_eq!(WireStatus::from(Status::InShutdown) as i32, 2);
        assert_eq!(WireStatus::from(Status::Stopped) as i32, 3);
        assert_eq!(status_from_wire(42), Status::Unknown);
        assert_eq!(status_from_wire(2), Status::InShutdown);
    }

    #[test]
    fn order_follows_lifecycle() {
        assert!(Status::Unknown < Status::Running);
        assert!(Status::Running < Status::InShutdown);
        assert!(Status::InShutdown < Status::Stopped);
    }
}
