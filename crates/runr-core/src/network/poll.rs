use runr_model::JobResponse;

/// Result of one job request tick.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPoll {
    /// A job was handed out.
    Job(Box<JobResponse>),
    /// Nothing to do this tick; the upstream is healthy.
    NoJob,
    /// The upstream misbehaved; the caller may back off.
    Unhealthy,
}

impl JobPoll {
    /// False only for [`JobPoll::Unhealthy`].
    #[inline]
    pub fn is_healthy(&self) -> bool {
        !matches!(self, JobPoll::Unhealthy)
    }

    /// The job, if one was handed out.
    pub fn into_job(self) -> Option<JobResponse> {
        match self {
            JobPoll::Job(job) => Some(*job),
            _ => None,
        }
    }

    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            JobPoll::Job(_) => "job",
            JobPoll::NoJob => "no_job",
            JobPoll::Unhealthy => "unhealthy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_follows_variant() {
        assert!(JobPoll::NoJob.is_healthy());
        assert!(JobPoll::Job(Box::default()).is_healthy());
        assert!(!JobPoll::Unhealthy.is_healthy());
    }

    #[test]
    fn into_job_unwraps_only_jobs() {
        let job = JobResponse {
            id: 7,
            ..Default::default()
        };
        assert_eq!(JobPoll::Job(Box::new(job)).into_job().map(|j| j.id), Some(7));
        assert!(JobPoll::NoJob.into_job().is_none());
    }
}
