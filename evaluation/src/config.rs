use std::time::Duration;

/// Above this many logical cores one is left idle for the rest of the system.
const RESERVE_CORE_THRESHOLD: usize = 4;

#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Index of the engine to instantiate for every position.
    pub engine: usize,
    /// Wall-clock analysis budget per position.
    pub move_time: Duration,
    /// Interval between scheduler ticks.
    pub tick_interval: Duration,
    /// Overrides the detected target concurrency.
    pub threads: Option<usize>,
    /// Finish a worker whose engine has not started analysing within this
    /// long after construction. `None` waits indefinitely.
    pub start_timeout: Option<Duration>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            engine: 0,
            move_time: Duration::from_millis(1000),
            tick_interval: Duration::from_millis(100),
            threads: None,
            start_timeout: None,
        }
    }
}

impl EvaluationConfig {
    pub fn concurrency(&self) -> usize {
        match self.threads {
            Some(threads) => threads.max(1),
            None => target_concurrency(num_cpus::get()),
        }
    }
}

/// Number of engines allowed to run at once given the available parallelism.
pub fn target_concurrency(parallelism: usize) -> usize {
    let target = parallelism.max(1);
    if target > RESERVE_CORE_THRESHOLD {
        target - 1
    } else {
        target
    }
}
