use crate::config::VigilConfig;
use crate::error::{Result, VigilError};
use crate::health::HealthVerdict;
use crate::state::RestartHistory;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Restart rate-limit settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Maximum number of restarts within the time window
    pub max_restarts: usize,
    /// Sliding window for counting restarts
    pub window: Duration,
    /// Enforced pause once the budget is exhausted
    pub cooldown: Duration,
    /// Uptime below which only a dead workload may be restarted
    pub stable_run_time: Duration,
}

impl RestartPolicy {
    pub fn from_config(config: &VigilConfig) -> Self {
        Self {
            max_restarts: config.policy.max_restarts,
            window: config.window(),
            cooldown: config.cooldown(),
            stable_run_time: config.stable_run_time(),
        }
    }
}

/// Outcome of asking whether the workload may be restarted now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    /// Go ahead
    Allow,
    /// Workload is still warming up; ignore staleness and log errors for `remaining`
    Suppressed { remaining: Duration },
    /// Budget exhausted; no restarts until `until`
    Cooldown { until: SystemTime },
    /// The verdict does not call for a restart
    NotApplicable,
}

impl RestartDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RestartDecision::Allow)
    }

    pub fn reason(&self) -> String {
        match self {
            RestartDecision::Allow => "restart permitted".to_string(),
            RestartDecision::Suppressed { remaining } => format!(
                "within stability period, {}s remaining",
                remaining.as_secs()
            ),
            RestartDecision::Cooldown { until } => {
                let left = until
                    .duration_since(SystemTime::now())
                    .unwrap_or_default()
                    .as_secs();
                format!("restart budget exhausted, cooling down for {}s", left)
            }
            RestartDecision::NotApplicable => "no restart needed".to_string(),
        }
    }
}

/// Process-wide supervision state, written only by the control loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorState {
    pub restart_count_in_window: usize,
    pub last_start_time: Option<SystemTime>,
    pub stable_since: Option<SystemTime>,
    pub cooldown_until: Option<SystemTime>,
}

/// Read-only view of the restart budget, for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub restarts_in_window: usize,
    pub max_restarts: usize,
    pub window_secs: u64,
    pub last_restart: Option<SystemTime>,
}

impl HistorySummary {
    pub fn from_history(
        history: &RestartHistory,
        policy: &RestartPolicy,
        now: SystemTime,
    ) -> Self {
        Self {
            restarts_in_window: history.count_within(now, policy.window),
            max_restarts: policy.max_restarts,
            window_secs: policy.window.as_secs(),
            last_restart: history.last(),
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.restarts_in_window >= self.max_restarts
    }
}

/// Stateful gatekeeper for restarts: rate limit, cooldown, stability window
pub struct RestartEngine {
    policy: RestartPolicy,
    history: RestartHistory,
    state: SupervisorState,
}

impl RestartEngine {
    pub fn new(policy: RestartPolicy, history: RestartHistory) -> Self {
        let state = SupervisorState {
            restart_count_in_window: history.len(),
            ..SupervisorState::default()
        };
        Self {
            policy,
            history,
            state,
        }
    }

    /// Load the persisted history at `path` and drop events outside the window
    pub fn open<P: AsRef<Path>>(policy: RestartPolicy, path: P, now: SystemTime) -> Result<Self> {
        let mut history = RestartHistory::load(path)?;
        let retained = history.prune(now, policy.window)?;
        if retained > 0 {
            info!(
                restarts = retained,
                window_secs = policy.window.as_secs(),
                "Loaded restart history"
            );
        }
        Ok(Self::new(policy, history))
    }

    /// Decide whether `verdict` may trigger a restart at `now`
    ///
    /// Denying for budget reasons starts the cooldown; the caller must block
    /// until `until` and then call [`RestartEngine::finish_cooldown`].
    pub fn may_restart(&mut self, now: SystemTime, verdict: &HealthVerdict) -> RestartDecision {
        if !verdict.triggers_restart() {
            return RestartDecision::NotApplicable;
        }

        if let Some(until) = self.state.cooldown_until {
            if now < until {
                return RestartDecision::Cooldown { until };
            }
            self.finish_cooldown_logged();
        }

        let count = match self.history.prune(now, self.policy.window) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to persist pruned restart history: {}", e);
                self.history.count_within(now, self.policy.window)
            }
        };
        self.state.restart_count_in_window = count;

        if count >= self.policy.max_restarts {
            let until = self.begin_cooldown(now);
            warn!(
                restarts = count,
                window_secs = self.policy.window.as_secs(),
                cooldown_secs = self.policy.cooldown.as_secs(),
                "{}",
                VigilError::RestartBudgetExhausted(count)
            );
            return RestartDecision::Cooldown { until };
        }

        if verdict.requires_stability() {
            let uptime = self
                .state
                .last_start_time
                .and_then(|started| now.duration_since(started).ok())
                .unwrap_or(Duration::ZERO);
            let never_started = self.state.last_start_time.is_none();

            if !never_started && uptime <= self.policy.stable_run_time {
                return RestartDecision::Suppressed {
                    remaining: self.policy.stable_run_time - uptime,
                };
            }
        }

        RestartDecision::Allow
    }

    /// Block restarts until `now + cooldown`
    pub fn begin_cooldown(&mut self, now: SystemTime) -> SystemTime {
        let until = now + self.policy.cooldown;
        self.state.cooldown_until = Some(until);
        until
    }

    /// Charge one restart against the budget
    pub fn record_restart(&mut self, now: SystemTime) -> Result<()> {
        self.state.stable_since = None;
        self.history.record(now)?;
        self.state.restart_count_in_window = self.history.count_within(now, self.policy.window);
        Ok(())
    }

    /// Note a confirmed workload start
    pub fn record_start(&mut self, now: SystemTime) {
        self.state.last_start_time = Some(now);
        self.state.stable_since = None;
    }

    /// Mark the workload stable once it has outlived the stability period.
    /// Returns true on the tick where that happens.
    pub fn observe(&mut self, now: SystemTime) -> bool {
        if self.state.stable_since.is_some() {
            return false;
        }
        let Some(started) = self.state.last_start_time else {
            return false;
        };
        match now.duration_since(started) {
            Ok(uptime) if uptime > self.policy.stable_run_time => {
                self.state.stable_since = Some(now);
                info!(uptime_secs = uptime.as_secs(), "Workload reached stable run time");
                true
            }
            _ => false,
        }
    }

    /// End the cooldown and wipe the restart history
    pub fn finish_cooldown(&mut self) -> Result<()> {
        self.state.cooldown_until = None;
        self.state.restart_count_in_window = 0;
        self.history.clear()?;
        info!("Cooldown complete, restart history cleared");
        Ok(())
    }

    fn finish_cooldown_logged(&mut self) {
        if let Err(e) = self.finish_cooldown() {
            warn!("Failed to clear restart history after cooldown: {}", e);
        }
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn history(&self) -> &RestartHistory {
        &self.history
    }
}
