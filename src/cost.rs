//! Per-call token ledger with hard per-task budget enforcement

use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::config::CostConfig;
use crate::trace::{EventType, TraceRecorder};
use crate::{Error, Result};

/// Record of a single API call's token usage and cost
#[derive(Debug, Clone, Serialize)]
pub struct ApiCallRecord {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
}

impl ApiCallRecord {
    pub fn total_cost(&self) -> f64 {
        self.input_cost + self.output_cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Aggregate projection over the ledger
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_savings_usd: f64,
    pub api_calls: usize,
    pub budget_remaining_usd: f64,
}

#[derive(Default)]
struct Ledger {
    records: Vec<ApiCallRecord>,
    cache_savings: f64,
}

/// Tracks API costs per task with budget enforcement.
///
/// Records every API call, prices it from the configured table, and fails
/// with [`Error::BudgetExceeded`] once the task budget is spent. A call that
/// arrives after the budget is exhausted is rejected without being appended;
/// the call that crosses the line is itself recorded.
pub struct CostAccountant {
    config: CostConfig,
    trace: Option<Arc<TraceRecorder>>,
    ledger: Mutex<Ledger>,
}

impl CostAccountant {
    pub fn new(config: CostConfig, trace: Option<Arc<TraceRecorder>>) -> Self {
        CostAccountant {
            config,
            trace,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Record an API call and enforce the budget.
    ///
    /// Cached input tokens are credited as savings rather than billed. An
    /// unknown model logs a warning and contributes zero cost.
    pub fn record_call(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        cached_tokens: u64,
    ) -> Result<ApiCallRecord> {
        let budget = self.config.budget_per_task_usd;
        let mut ledger = self.lock();

        let spent: f64 = ledger.records.iter().map(|r| r.total_cost()).sum();
        if spent > budget {
            return Err(Error::BudgetExceeded { spent, budget });
        }

        let (input_cost, output_cost, cache_saving) = match self.config.pricing.get(model) {
            Some(p) => (
                (input_tokens as f64 / 1000.0) * p.input_per_1k,
                (output_tokens as f64 / 1000.0) * p.output_per_1k,
                (cached_tokens as f64 / 1000.0) * p.input_per_1k,
            ),
            None => {
                warn!("No pricing found for model {}, assuming zero cost", model);
                (0.0, 0.0, 0.0)
            }
        };

        let record = ApiCallRecord {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cached_tokens,
            input_cost,
            output_cost,
        };
        ledger.cache_savings += cache_saving;
        ledger.records.push(record.clone());

        let total = spent + record.total_cost();
        if total > budget * 0.8 {
            warn!(
                "Cost warning: ${:.4} of ${:.4} budget ({:.0}%)",
                total,
                budget,
                (total / budget) * 100.0
            );
            if let Some(trace) = &self.trace {
                trace.record(
                    EventType::BudgetWarning,
                    json!({
                        "spent": total,
                        "budget": budget,
                        "pct": (total / budget) * 100.0,
                    }),
                );
            }
        }

        Ok(record)
    }

    /// Credit savings realised outside the token ledger (e.g. a cache hit)
    pub fn credit_savings(&self, amount_usd: f64) {
        self.lock().cache_savings += amount_usd;
    }

    /// Total cost across all recorded API calls
    pub fn total_cost(&self) -> f64 {
        self.lock().records.iter().map(|r| r.total_cost()).sum()
    }

    /// Total tokens across all recorded API calls
    pub fn total_tokens(&self) -> u64 {
        self.lock().records.iter().map(|r| r.total_tokens()).sum()
    }

    pub fn cache_savings(&self) -> f64 {
        self.lock().cache_savings
    }

    pub fn call_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Aggregate summary over the ledger
    pub fn summary(&self) -> CostSummary {
        let ledger = self.lock();
        let total_cost: f64 = ledger.records.iter().map(|r| r.total_cost()).sum();
        CostSummary {
            total_cost_usd: total_cost,
            total_tokens: ledger.records.iter().map(|r| r.total_tokens()).sum(),
            input_tokens: ledger.records.iter().map(|r| r.input_tokens).sum(),
            output_tokens: ledger.records.iter().map(|r| r.output_tokens).sum(),
            cache_savings_usd: ledger.cache_savings,
            api_calls: ledger.records.len(),
            budget_remaining_usd: self.config.budget_per_task_usd - total_cost,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
