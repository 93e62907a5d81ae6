/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    /// A fatal condition; the supervisor is expected to restart us
    Error(String),
}

impl ShutdownReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) => 0,
            ShutdownReason::Error(_) => 1,
        }
    }
}
