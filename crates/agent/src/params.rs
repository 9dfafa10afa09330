use std::time::Duration;

pub const DEFAULT_SLEEP_TIME: Duration = Duration::from_millis(250);
pub const DEFAULT_RETRY_ATTEMPTS: usize = 5;
pub const DEFAULT_SUBMIT_ATTEMPTS: usize = 3;

/// Tunables shared by all behaviours of a peer
#[derive(Debug, Clone)]
pub struct BehaviourParams {
    sleep_time: Duration,
    retry_attempts: usize,
    submit_attempts: usize,
    submit_timeout: Duration,
    inclusion_timeout: Duration,
    request_timeout: Duration,
    healthcheck_timeout: Duration,
    max_backoff: Duration,
}

impl Default for BehaviourParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[bon::bon]
impl BehaviourParams {
    #[builder]
    pub fn new(
        /// Pause between polls and retries
        #[builder(default = DEFAULT_SLEEP_TIME)]
        sleep_time: Duration,
        /// Attempts at an external call before giving up on it
        #[builder(default = DEFAULT_RETRY_ATTEMPTS)]
        retry_attempts: usize,
        /// Submissions of a payload before backing off
        #[builder(default = DEFAULT_SUBMIT_ATTEMPTS)]
        submit_attempts: usize,
        #[builder(default = Duration::from_secs(5))] submit_timeout: Duration,
        /// How long to wait for the round to end after a submission
        #[builder(default = Duration::from_secs(2))]
        inclusion_timeout: Duration,
        #[builder(default = Duration::from_secs(10))] request_timeout: Duration,
        #[builder(default = Duration::from_secs(30))] healthcheck_timeout: Duration,
        #[builder(default = Duration::from_secs(10))] max_backoff: Duration,
    ) -> Self {
        Self {
            sleep_time,
            retry_attempts: retry_attempts.max(1),
            submit_attempts: submit_attempts.max(1),
            submit_timeout,
            inclusion_timeout,
            request_timeout,
            healthcheck_timeout,
            max_backoff,
        }
    }

    pub fn sleep_time(&self) -> Duration {
        self.sleep_time
    }

    pub fn retry_attempts(&self) -> usize {
        self.retry_attempts
    }

    pub fn submit_attempts(&self) -> usize {
        self.submit_attempts
    }

    pub fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }

    pub fn inclusion_timeout(&self) -> Duration {
        self.inclusion_timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn healthcheck_timeout(&self) -> Duration {
        self.healthcheck_timeout
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}
