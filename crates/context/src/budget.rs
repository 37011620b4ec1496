//! Token budgets and per-source allocation.
//!
//! Token-first design: the context window is carved into an output
//! reserve, the system prompt's cost, and an `available` remainder that
//! is split across named sources by normalized ratios. The adaptive
//! variant swaps the ratio map as the task moves through phases.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use mnemo_core::counter::TokenCounter;
use mnemo_core::message::MessageRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A token budget derived from the model context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Model context window size
    pub total: usize,

    /// Tokens reserved for model output
    pub reserved_output: usize,

    /// Tokens consumed by the fixed system prompt
    pub system_prompt: usize,
}

impl TokenBudget {
    /// Tokens available for assembled context; 0 when the window is
    /// already oversubscribed.
    pub fn available(&self) -> usize {
        self.total
            .saturating_sub(self.reserved_output)
            .saturating_sub(self.system_prompt)
    }
}

/// Integer token grants per source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub allocations: HashMap<String, usize>,
}

impl BudgetAllocation {
    pub fn get(&self, source_name: &str) -> usize {
        self.allocations.get(source_name).copied().unwrap_or(0)
    }

    pub fn total_allocated(&self) -> usize {
        self.allocations.values().sum()
    }
}

/// Task progress bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    #[default]
    Early,
    Middle,
    Late,
}

impl TaskPhase {
    /// Classify progress: ≤30% early, 30–70% middle, >70% late.
    pub fn from_progress(iteration: usize, max_iterations: usize) -> Self {
        if max_iterations == 0 {
            return TaskPhase::Early;
        }
        let ratio = iteration as f64 / max_iterations as f64;
        if ratio <= 0.3 {
            TaskPhase::Early
        } else if ratio <= 0.7 {
            TaskPhase::Middle
        } else {
            TaskPhase::Late
        }
    }
}

/// Default allocation ratio template per phase.
///
/// Early favors the fixed region (understanding the task), middle favors
/// the working dialogue region (executing), late favors retrieval and
/// inherited context (staying consistent while concluding).
pub fn phase_allocation_template(phase: TaskPhase) -> HashMap<String, f64> {
    let table: &[(&str, f64)] = match phase {
        TaskPhase::Early => &[
            ("system_prompt", 0.18),
            ("tools", 0.15),
            ("skills", 0.12),
            ("L1_recent", 0.17),
            ("L2_important", 0.10),
            ("shared_pool", 0.03),
            ("retrieval", 0.20),
            ("INHERITED", 0.05),
        ],
        TaskPhase::Middle => &[
            ("system_prompt", 0.10),
            ("tools", 0.10),
            ("skills", 0.06),
            ("L1_recent", 0.26),
            ("L2_important", 0.16),
            ("shared_pool", 0.06),
            ("retrieval", 0.20),
            ("INHERITED", 0.06),
        ],
        TaskPhase::Late => &[
            ("system_prompt", 0.08),
            ("tools", 0.08),
            ("skills", 0.04),
            ("L1_recent", 0.17),
            ("L2_important", 0.11),
            ("shared_pool", 0.04),
            ("retrieval", 0.18),
            ("INHERITED", 0.30),
        ],
    };
    table.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Flat budget manager with a fixed ratio map.
pub struct BudgetManager {
    counter: Arc<dyn TokenCounter>,
    model_context_window: usize,
    output_reserve_ratio: f64,
    ratios: HashMap<String, f64>,
}

impl BudgetManager {
    /// `allocation_ratios` defaults to the middle-phase template, the
    /// steady-state of the adaptive variant.
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        model_context_window: usize,
        output_reserve_ratio: f64,
        allocation_ratios: Option<HashMap<String, f64>>,
    ) -> Self {
        let ratios = Self::normalize(
            allocation_ratios.unwrap_or_else(|| phase_allocation_template(TaskPhase::Middle)),
        );
        Self {
            counter,
            model_context_window,
            output_reserve_ratio,
            ratios,
        }
    }

    fn normalize(ratios: HashMap<String, f64>) -> HashMap<String, f64> {
        let total: f64 = ratios.values().sum();
        if total <= 0.0 {
            return phase_allocation_template(TaskPhase::Middle);
        }
        ratios.into_iter().map(|(k, v)| (k, v / total)).collect()
    }

    /// Replace the active ratio map (normalized).
    pub fn set_ratios(&mut self, ratios: HashMap<String, f64>) {
        self.ratios = Self::normalize(ratios);
    }

    pub fn ratios(&self) -> &HashMap<String, f64> {
        &self.ratios
    }

    /// Derive a budget for the current system prompt.
    pub fn create_budget(&self, system_prompt: &str) -> TokenBudget {
        let reserved_output =
            (self.model_context_window as f64 * self.output_reserve_ratio).round() as usize;
        let system_tokens = if system_prompt.is_empty() {
            0
        } else {
            self.counter
                .count_message(&MessageRecord::system(system_prompt))
        };
        TokenBudget {
            total: self.model_context_window,
            reserved_output,
            system_prompt: system_tokens,
        }
    }

    /// Split `available` across every configured source.
    pub fn allocate(&self, budget: &TokenBudget) -> BudgetAllocation {
        let available = budget.available();
        BudgetAllocation {
            allocations: self
                .ratios
                .iter()
                .map(|(source, ratio)| (source.clone(), (available as f64 * ratio) as usize))
                .collect(),
        }
    }

    /// Split `available` across a subset, renormalizing over that subset.
    /// Sources without a configured ratio get a 0.1 share before
    /// normalization.
    pub fn allocate_for_sources(
        &self,
        budget: &TokenBudget,
        source_names: &[&str],
    ) -> BudgetAllocation {
        let filtered: HashMap<String, f64> = source_names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    self.ratios.get(*name).copied().unwrap_or(0.1),
                )
            })
            .collect();
        let normalized = Self::normalize(filtered);

        let available = budget.available();
        BudgetAllocation {
            allocations: normalized
                .into_iter()
                .map(|(source, ratio)| (source, (available as f64 * ratio) as usize))
                .collect(),
        }
    }
}

/// Budget manager that retunes its ratio map by task phase.
pub struct AdaptiveBudgetManager {
    inner: Mutex<BudgetManager>,
    phase: Mutex<TaskPhase>,
}

impl AdaptiveBudgetManager {
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        model_context_window: usize,
        output_reserve_ratio: f64,
    ) -> Self {
        let phase = TaskPhase::Early;
        Self {
            inner: Mutex::new(BudgetManager::new(
                counter,
                model_context_window,
                output_reserve_ratio,
                Some(phase_allocation_template(phase)),
            )),
            phase: Mutex::new(phase),
        }
    }

    /// Recompute the phase from progress and swap the template when it
    /// changed. A repeated call with the same progress is a no-op.
    pub fn update_phase(&self, iteration: usize, max_iterations: usize) -> TaskPhase {
        let next = TaskPhase::from_progress(iteration, max_iterations);
        let mut current = self.phase.lock().expect("phase lock");
        if *current != next {
            debug!(from = ?*current, to = ?next, "budget phase transition");
            *current = next;
            self.inner
                .lock()
                .expect("budget lock")
                .set_ratios(phase_allocation_template(next));
        }
        next
    }

    pub fn current_phase(&self) -> TaskPhase {
        *self.phase.lock().expect("phase lock")
    }

    pub fn create_budget(&self, system_prompt: &str) -> TokenBudget {
        self.inner.lock().expect("budget lock").create_budget(system_prompt)
    }

    pub fn allocate(&self, budget: &TokenBudget) -> BudgetAllocation {
        self.inner.lock().expect("budget lock").allocate(budget)
    }

    pub fn allocate_for_sources(
        &self,
        budget: &TokenBudget,
        source_names: &[&str],
    ) -> BudgetAllocation {
        self.inner
            .lock()
            .expect("budget lock")
            .allocate_for_sources(budget, source_names)
    }
}
