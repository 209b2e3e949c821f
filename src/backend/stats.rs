//! Per-backend call statistics
//!
//! Every backend handle owns one [`CallStats`]. It keeps rolling latency and
//! token-usage windows, monotonic call counters, day/month scoped counters and
//! a locally simulated token budget. None of these figures come from the
//! provider; they exist for observability and are never used for enforcement.

use chrono::{DateTime, Datelike, Local, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use utoipa::ToSchema;

use crate::config::BudgetConfig;

/// Capacity of the latency and token-usage windows
pub const WINDOW_CAPACITY: usize = 100;

/// Outcome of one generation or connectivity-test call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallRecord {
    pub success: bool,
    pub latency_ms: f64,
    pub tokens_used: u64,
}

impl CallRecord {
    pub fn success(latency_ms: f64, tokens_used: u64) -> Self {
        Self {
            success: true,
            latency_ms,
            tokens_used,
        }
    }

    pub fn failure(latency_ms: f64) -> Self {
        Self {
            success: false,
            latency_ms,
            tokens_used: 0,
        }
    }
}

/// Immutable view of a tracker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StatsSnapshot {
    pub remaining_tokens: u64,
    pub total_tokens: u64,
    pub today_calls: u64,
    pub daily_limit: u64,
    pub month_calls: u64,
    pub monthly_limit: u64,
    pub last_call_time: Option<DateTime<Local>>,
    /// Mean latency of the window, in milliseconds
    pub avg_response_time: f64,
    pub success_rate: f64,
    pub avg_token_usage: u64,
    #[serde(skip)]
    pub total_calls: u64,
    #[serde(skip)]
    pub success_calls: u64,
}

#[derive(Debug)]
struct StatsState {
    response_times: VecDeque<f64>,
    token_usages: VecDeque<u64>,
    total_count: u64,
    success_count: u64,
    today_calls: u64,
    last_reset_day: NaiveDate,
    month_calls: u64,
    last_reset_month: (i32, u32),
    last_call_time: Option<DateTime<Local>>,
    remaining_tokens: u64,
}

impl StatsState {
    fn new(budget: &BudgetConfig, now: DateTime<Local>) -> Self {
        Self {
            response_times: VecDeque::with_capacity(WINDOW_CAPACITY),
            token_usages: VecDeque::with_capacity(WINDOW_CAPACITY),
            total_count: 0,
            success_count: 0,
            today_calls: 0,
            last_reset_day: now.date_naive(),
            month_calls: 0,
            last_reset_month: (now.year(), now.month()),
            last_call_time: None,
            remaining_tokens: budget.total_tokens,
        }
    }

    fn roll_over(&mut self, now: DateTime<Local>) {
        let today = now.date_naive();
        if today != self.last_reset_day {
            self.today_calls = 0;
            self.last_reset_day = today;
        }

        let month = (now.year(), now.month());
        if month != self.last_reset_month {
            self.month_calls = 0;
            self.last_reset_month = month;
        }
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, value: T) {
    if window.len() == WINDOW_CAPACITY {
        window.pop_front();
    }
    window.push_back(value);
}

/// Rolling call statistics for one backend
#[derive(Debug)]
pub struct CallStats {
    budget: BudgetConfig,
    state: Mutex<StatsState>,
}

impl CallStats {
    pub fn new(budget: BudgetConfig) -> Self {
        Self::starting_at(budget, Local::now())
    }

    /// Create a tracker whose day/month markers start at `now`
    pub fn starting_at(budget: BudgetConfig, now: DateTime<Local>) -> Self {
        Self {
            budget,
            state: Mutex::new(StatsState::new(&budget, now)),
        }
    }

    pub fn record(&self, record: CallRecord) {
        self.record_call(record.success, record.latency_ms, record.tokens_used);
    }

    pub fn record_call(&self, success: bool, latency_ms: f64, tokens_used: u64) {
        self.record_call_at(Local::now(), success, latency_ms, tokens_used);
    }

    /// Record a call as if it finished at `now`
    pub fn record_call_at(&self, now: DateTime<Local>, success: bool, latency_ms: f64, tokens_used: u64) {
        let mut state = self.state.lock();
        state.roll_over(now);

        state.last_call_time = Some(now);
        state.today_calls += 1;
        state.month_calls += 1;
        state.total_count += 1;
        if success {
            state.success_count += 1;
        }

        push_bounded(&mut state.response_times, latency_ms);
        if tokens_used > 0 {
            push_bounded(&mut state.token_usages, tokens_used);
            state.remaining_tokens = state.remaining_tokens.saturating_sub(tokens_used);
        }
    }

    pub fn avg_response_time(&self) -> f64 {
        let state = self.state.lock();
        mean_latency(&state.response_times)
    }

    pub fn success_rate(&self) -> f64 {
        let state = self.state.lock();
        success_rate(state.success_count, state.total_count)
    }

    pub fn avg_token_usage(&self) -> u64 {
        let state = self.state.lock();
        mean_tokens(&state.token_usages)
    }

    pub fn total_count(&self) -> u64 {
        self.state.lock().total_count
    }

    pub fn success_count(&self) -> u64 {
        self.state.lock().success_count
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.state.lock();
        StatsSnapshot {
            remaining_tokens: state.remaining_tokens,
            total_tokens: self.budget.total_tokens,
            today_calls: state.today_calls,
            daily_limit: self.budget.daily_limit,
            month_calls: state.month_calls,
            monthly_limit: self.budget.monthly_limit,
            last_call_time: state.last_call_time,
            avg_response_time: mean_latency(&state.response_times),
            success_rate: success_rate(state.success_count, state.total_count),
            avg_token_usage: mean_tokens(&state.token_usages),
            total_calls: state.total_count,
            success_calls: state.success_count,
        }
    }

    /// Latency window contents, oldest first
    pub fn response_times(&self) -> Vec<f64> {
        self.state.lock().response_times.iter().copied().collect()
    }

    /// Token-usage window contents, oldest first
    pub fn token_usages(&self) -> Vec<u64> {
        self.state.lock().token_usages.iter().copied().collect()
    }
}

impl Default for CallStats {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}

fn mean_latency(window: &VecDeque<f64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<f64>() / window.len() as f64
}

fn mean_tokens(window: &VecDeque<u64>) -> u64 {
    if window.is_empty() {
        return 0;
    }
    window.iter().sum::<u64>() / window.len() as u64
}

fn success_rate(success: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        success as f64 / total as f64
    }
}
