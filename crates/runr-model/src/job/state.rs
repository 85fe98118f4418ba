use std::{fmt, str::FromStr, time::SystemTime};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ModelError;

/// Runtime state of a build as tracked by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuildRuntimeState {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Terminated,
    TimedOut,
}

impl BuildRuntimeState {
    /// Lowercase name, as written to logs and metric labels.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Terminated => "terminated",
            Self::TimedOut => "timedout",
        }
    }

    /// Whether the build can no longer change state.
    #[inline]
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for BuildRuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildRuntimeState {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            "terminated" => Ok(Self::Terminated),
            "timedout" => Ok(Self::TimedOut),
            other => Err(ModelError::UnknownBuildState(other.to_string())),
        }
    }
}

impl Serialize for BuildRuntimeState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BuildRuntimeState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Mutable state persisted alongside a job.
///
/// `build_state` only moves forward: once running it never returns to
/// pending, and a final state is never replaced. `health_check_at` is only
/// ever moved forward in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRuntimeState {
    retries: u32,
    build_state: BuildRuntimeState,
    stage: String,
    health_check_at: SystemTime,
    started_at: SystemTime,
    sent_trace: u64,
    #[serde(default)]
    executor_state: Option<serde_json::Value>,
    #[serde(skip)]
    resumed_from_stage: Option<String>,
}

impl Default for JobRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRuntimeState {
    /// Fresh state: pending, no retries, health and start stamped now.
    pub fn new() -> Self {
        let now = SystemTime::now();
        Self {
            retries: 0,
            build_state: BuildRuntimeState::Pending,
            stage: String::new(),
            health_check_at: now,
            started_at: now,
            sent_trace: 0,
            executor_state: None,
            resumed_from_stage: None,
        }
    }

    /// Builder-style override of the health timestamp, mainly for fixtures.
    pub fn with_health_check_at(mut self, at: SystemTime) -> Self {
        self.health_check_at = at;
        self
    }

    /// Builder-style override of the retry counter.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Builder-style override of the build state, bypassing transition checks.
    pub fn with_build_state(mut self, state: BuildRuntimeState) -> Self {
        self.build_state = state;
        self
    }

    /// Apply a state transition. Returns `false` when the transition was refused.
    pub fn set_build_state(&mut self, next: BuildRuntimeState) -> bool {
        let current = self.build_state;
        let allowed = match (current, next) {
            (a, b) if a == b => true,
            (c, _) if c.is_final() => false,
            (_, BuildRuntimeState::Pending) => false,
            _ => true,
        };
        if allowed {
            self.build_state = next;
        }
        allowed
    }

    #[inline]
    pub fn build_state(&self) -> BuildRuntimeState {
        self.build_state
    }

    /// Record the stage currently executing.
    pub fn set_stage(&mut self, stage: impl Into<String>) {
        self.stage = stage.into();
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Refresh the health timestamp to now.
    pub fn update_health(&mut self) {
        self.touch_health(SystemTime::now());
    }

    /// Move the health timestamp to `at` unless it would go backwards.
    pub fn touch_health(&mut self, at: SystemTime) {
        if at > self.health_check_at {
            self.health_check_at = at;
        }
    }

    /// Last time the owning runner proved it was alive.
    #[inline]
    pub fn health_check_at(&self) -> SystemTime {
        self.health_check_at
    }

    #[inline]
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    #[inline]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Mark the job as picked up again by a new runner generation.
    pub fn resume(&mut self) {
        self.retries = self.retries.saturating_add(1);
        self.resumed_from_stage = Some(self.stage.clone());
    }

    /// A job counts as resumed once it was retried from a known stage.
    pub fn is_resumed(&self) -> bool {
        self.retries > 0 && self.resumed_from_stage.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Stage the job was at when it was last resumed.
    pub fn resumed_from_stage(&self) -> Option<&str> {
        self.resumed_from_stage.as_deref()
    }

    pub fn clear_resumed_from_stage(&mut self) {
        self.resumed_from_stage = None;
    }

    /// Record how many trace bytes upstream has acknowledged.
    pub fn set_sent_trace(&mut self, offset: u64) {
        self.sent_trace = offset;
    }

    /// Trace bytes already sent. A resumed job continues from here.
    #[inline]
    pub fn sent_trace(&self) -> u64 {
        self.sent_trace
    }

    /// Opaque executor-specific state carried across runner generations.
    pub fn executor_state(&self) -> Option<&serde_json::Value> {
        self.executor_state.as_ref()
    }

    pub fn set_executor_state(&mut self, state: Option<serde_json::Value>) {
        self.executor_state = state;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn never_returns_to_pending() {
        let mut state = JobRuntimeState::new();
        assert!(state.set_build_state(BuildRuntimeState::Running));
        assert!(!state.set_build_state(BuildRuntimeState::Pending));
        assert_eq!(state.build_state(), BuildRuntimeState::Running);
    }

    #[test]
    fn final_states_are_sticky() {
        let mut state = JobRuntimeState::new();
        assert!(state.set_build_state(BuildRuntimeState::Failed));
        assert!(!state.set_build_state(BuildRuntimeState::Running));
        assert!(!state.set_build_state(BuildRuntimeState::Success));
        assert!(state.set_build_state(BuildRuntimeState::Failed));
        assert_eq!(state.build_state(), BuildRuntimeState::Failed);
    }

    #[test]
    fn health_only_moves_forward() {
        let mut state = JobRuntimeState::new();
        let at = state.health_check_at();

        state.touch_health(at - Duration::from_secs(60));
        assert_eq!(state.health_check_at(), at);

        state.touch_health(at + Duration::from_secs(60));
        assert_eq!(state.health_check_at(), at + Duration::from_secs(60));
    }

    #[test]
    fn resume_bumps_retries_and_remembers_stage() {
        let mut state = JobRuntimeState::new();
        assert!(!state.is_resumed());

        state.set_stage("step_script");
        state.resume();

        assert_eq!(state.retries(), 1);
        assert_eq!(state.resumed_from_stage(), Some("step_script"));
        assert!(state.is_resumed());

        state.clear_resumed_from_stage();
        assert!(!state.is_resumed());
    }

    #[test]
    fn build_state_parses_canonical_names() {
        for s in [
            BuildRuntimeState::Pending,
            BuildRuntimeState::Running,
            BuildRuntimeState::Success,
            BuildRuntimeState::Failed,
            BuildRuntimeState::Canceled,
            BuildRuntimeState::Terminated,
            BuildRuntimeState::TimedOut,
        ] {
            assert_eq!(s.as_str().parse::<BuildRuntimeState>().unwrap(), s);
        }
        assert_eq!("".parse::<BuildRuntimeState>().unwrap(), BuildRuntimeState::Pending);
        assert!("paused".parse::<BuildRuntimeState>().is_err());
    }

    #[test]
    fn build_state_serializes_as_string() {
        let json = serde_json::to_string(&BuildRuntimeState::TimedOut).unwrap();
        assert_eq!(json, r#""timedout""#);
    }
}
