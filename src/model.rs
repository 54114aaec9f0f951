use time::OffsetDateTime;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("playbook target must not be empty")]
    EmptyTarget,
}

/// A single request to run a playbook: the playbook path plus the arguments
/// forwarded to the wrapped tool ahead of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    target: String,
    arguments: Vec<String>,
}

impl Invocation {
    pub fn new(target: impl Into<String>, arguments: Vec<String>) -> Result<Self, InvocationError> {
        let target = target.into();
        if target.is_empty() {
            return Err(InvocationError::EmptyTarget);
        }
        Ok(Self { target, arguments })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Argument vector handed to the wrapped binary. The target is always last.
    pub fn argv(&self) -> Vec<&str> {
        self.arguments
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.target.as_str()))
            .collect()
    }
}

/// Outcome of one executed invocation, whether the playbook passed or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub invocation: Invocation,
    /// Captured right before the child was spawned.
    pub start_time: OffsetDateTime,
    pub output: String,
}

impl RunResult {
    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            target: self.invocation.target().to_string(),
            start_time: self.start_time,
        }
    }
}

/// Lightweight listing row; output stays in the store until requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub target: String,
    pub start_time: OffsetDateTime,
}
