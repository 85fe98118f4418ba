use std::time::{Duration, SystemTime};

use runr_model::{BuildRuntimeState, JobRuntimeState, StoreConfig};

fn since_health_check(state: &JobRuntimeState, now: SystemTime) -> Duration {
    now.duration_since(state.health_check_at()).unwrap_or_default()
}

/// An abandoned, unfinished job with retries left.
pub fn can_resume(state: &JobRuntimeState, now: SystemTime, config: &StoreConfig) -> bool {
    matches!(
        state.build_state(),
        BuildRuntimeState::Pending | BuildRuntimeState::Running
    ) && since_health_check(state, now) > config.health_timeout()
        && state.retries() < config.max_retries
}

/// A finished job, a stale one, or an abandoned one out of retries.
pub fn can_delete(state: &JobRuntimeState, now: SystemTime, config: &StoreConfig) -> bool {
    let idle = since_health_check(state, now);
    matches!(
        state.build_state(),
        BuildRuntimeState::Canceled
            | BuildRuntimeState::Failed
            | BuildRuntimeState::Terminated
            | BuildRuntimeState::TimedOut
    ) || idle > config.stale_timeout()
        || (idle > config.health_timeout() && state.retries() >= config.max_retries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(60);

    fn state(build: BuildRuntimeState, idle: Duration, retries: u32, now: SystemTime) -> JobRuntimeState {
        JobRuntimeState::new()
            .with_build_state(build)
            .with_health_check_at(now - idle)
            .with_retries(retries)
    }

    #[test]
    fn resume_cases() {
        let now = SystemTime::now();
        let cfg = StoreConfig {
            health_timeout: 5 * 60,
            max_retries: 3,
            ..Default::default()
        };

        let cases = [
            (BuildRuntimeState::Running, 10 * MIN, 2, true),
            (BuildRuntimeState::Pending, 10 * MIN, 0, true),
            (BuildRuntimeState::Running, MIN, 0, false),
            (BuildRuntimeState::Running, 10 * MIN, 3, false),
            (BuildRuntimeState::Failed, 10 * MIN, 0, false),
            (BuildRuntimeState::Success, 10 * MIN, 0, false),
        ];
        for (build, idle, retries, want) in cases {
            let s = state(build, idle, retries, now);
            assert_eq!(can_resume(&s, now, &cfg), want, "{build} idle={idle:?} retries={retries}");
        }
    }

    #[test]
    fn delete_cases() {
        let now = SystemTime::now();
        let cfg = StoreConfig {
            health_timeout: 5 * 60,
            stale_timeout: 60 * 60,
            max_retries: 3,
            ..Default::default()
        };

        let cases = [
            (BuildRuntimeState::Failed, MIN, 0, true),
            (BuildRuntimeState::Canceled, MIN, 0, true),
            (BuildRuntimeState::Terminated, MIN, 0, true),
            (BuildRuntimeState::TimedOut, MIN, 0, true),
            (BuildRuntimeState::Running, 2 * 60 * MIN, 0, true),
            (BuildRuntimeState::Running, 10 * MIN, 3, true),
            (BuildRuntimeState::Running, 10 * MIN, 2, false),
            (BuildRuntimeState::Running, MIN, 5, false),
            (BuildRuntimeState::Success, MIN, 0, false),
        ];
        for (build, idle, retries, want) in cases {
            let s = state(build, idle, retries, now);
            assert_eq!(can_delete(&s, now, &cfg), want, "{build} idle={idle:?} retries={retries}");
        }
    }

    #[test]
    fn health_in_the_future_counts_as_fresh() {
        let now = SystemTime::now();
        let s = state(BuildRuntimeState::Running, Duration::ZERO, 0, now + MIN);
        let cfg = StoreConfig::default();
        assert!(!can_resume(&s, now, &cfg));
        assert!(!can_delete(&s, now, &cfg));
    }
}
