//! Pipeline state reporting

/// Outcome of the last pipeline step
///
/// This is what the driving thread looks at after `do_work()` / `get_frame()`
/// to decide whether to collect a frame, call again, or sleep until woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataState {
    /// A decoded frame is ready to be collected
    Ok,

    /// Blocked on the demuxer; call again only after its wake-up signal
    Wait,

    /// No more frames will be produced for this segment sequence
    Eof,

    /// No frame right now, but calling again may produce one immediately
    #[default]
    Again,
}

impl DataState {
    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            DataState::Ok => "Ok",
            DataState::Wait => "Wait",
            DataState::Eof => "Eof",
            DataState::Again => "Again",
        }
    }

    /// Check if a frame is ready
    pub fn is_ok(&self) -> bool {
        matches!(self, DataState::Ok)
    }

    /// Check if the driver must wait for an external wake-up
    pub fn is_waiting(&self) -> bool {
        matches!(self, DataState::Wait)
    }

    /// Check if the stream has ended
    pub fn is_eof(&self) -> bool {
        matches!(self, DataState::Eof)
    }

    /// Check if the driver should call again without waiting
    pub fn should_retry(&self) -> bool {
        matches!(self, DataState::Again)
    }
}

impl std::fmt::Display for DataState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_checks() {
        assert!(DataState::Ok.is_ok());
        assert!(!DataState::Ok.should_retry());

        assert!(DataState::Wait.is_waiting());
        assert!(!DataState::Wait.is_eof());

        assert!(DataState::Eof.is_eof());
        assert!(!DataState::Eof.is_ok());

        assert!(DataState::Again.should_retry());
        assert!(!DataState::Again.is_waiting());
    }

    #[test]
    fn test_default_is_again() {
        assert_eq!(DataState::default(), DataState::Again);
        assert_eq!(DataState::Wait.to_string(), "Wait");
    }
}
