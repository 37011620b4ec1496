//! L1 message window — the token-budgeted sliding window of chat records.
//!
//! Records are kept in insertion order. When an append pushes usage over
//! the budget, the window evicts from the oldest eligible record forward.
//! System records are never evicted, and tool-call/tool-result pairs leave
//! together so the wire protocol never sees an orphaned half.

use std::collections::HashSet;
use std::sync::Arc;

use mnemo_core::counter::TokenCounter;
use mnemo_core::message::{Content, MessageRecord, Role};
use tracing::debug;

/// Hook invoked with the records evicted by a single `append`.
pub type EvictionHook = Box<dyn Fn(&[MessageRecord]) + Send + Sync>;

/// The L1 sliding window.
pub struct MessageWindow {
    records: Vec<MessageRecord>,
    token_budget: usize,
    current_tokens: usize,
    counter: Arc<dyn TokenCounter>,
    hooks: Vec<EvictionHook>,
}

impl MessageWindow {
    pub fn new(token_budget: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            records: Vec::new(),
            token_budget,
            current_tokens: 0,
            counter,
            hooks: Vec::new(),
        }
    }

    /// Install a hook that receives each batch of evicted records.
    pub fn on_eviction(&mut self, hook: EvictionHook) {
        self.hooks.push(hook);
    }

    /// Append a record, evicting as needed to stay within budget.
    ///
    /// Returns the evicted records in window order. The incoming record is
    /// never selected for eviction by its own append: a record larger than
    /// the entire budget still lands, and the window sheds everything else
    /// it can around it.
    pub fn append(&mut self, record: MessageRecord) -> Vec<MessageRecord> {
        let incoming_id = record.id.clone();
        self.current_tokens += record.token_count;
        self.records.push(record);

        let mut evicted: Vec<MessageRecord> = Vec::new();
        while self.current_tokens > self.token_budget {
            let candidate = self.records.iter().position(|r| {
                r.role != Role::System
                    && r.id != incoming_id
                    && !evicted.iter().any(|e| e.id == r.id)
            });
            let Some(idx) = candidate else { break };

            let doomed = self.eviction_set(idx);
            let mut batch: Vec<MessageRecord> = Vec::new();
            self.records.retain(|r| {
                if doomed.contains(&r.id) {
                    batch.push(r.clone());
                    false
                } else {
                    true
                }
            });
            for r in &batch {
                self.current_tokens = self.current_tokens.saturating_sub(r.token_count);
            }
            evicted.extend(batch);
        }

        if !evicted.is_empty() {
            debug!(
                count = evicted.len(),
                usage = self.current_tokens,
                budget = self.token_budget,
                "L1 eviction"
            );
            for hook in &self.hooks {
                hook(&evicted);
            }
        }
        evicted
    }

    /// Convenience: build a record from role + content, counting tokens via
    /// the configured counter when no count is supplied.
    pub fn append_message(
        &mut self,
        role: Role,
        content: impl Into<Content>,
        token_count: Option<usize>,
    ) -> Vec<MessageRecord> {
        let mut record = MessageRecord {
            role,
            ..MessageRecord::user(content.into())
        };
        record.token_count = match token_count {
            Some(n) => n,
            None => self.counter.count_message(&record),
        };
        self.append(record)
    }

    /// Compute the full set of record ids that must leave together with
    /// the record at `idx`.
    ///
    /// Evicting an assistant record takes every tool result answering one
    /// of its tool calls; evicting a tool record takes the assistant that
    /// owns its call, which in turn takes that assistant's other results.
    fn eviction_set(&self, idx: usize) -> HashSet<String> {
        let mut doomed = HashSet::new();
        let seed = &self.records[idx];
        doomed.insert(seed.id.clone());

        let mut call_ids: HashSet<String> =
            seed.tool_calls.iter().map(|tc| tc.id.clone()).collect();

        if let Some(tcid) = &seed.tool_call_id {
            // Tool record: pull in the owning assistant and all its calls.
            if let Some(owner) = self
                .records
                .iter()
                .find(|r| r.tool_calls.iter().any(|tc| &tc.id == tcid))
            {
                doomed.insert(owner.id.clone());
                call_ids.extend(owner.tool_calls.iter().map(|tc| tc.id.clone()));
            }
        }

        if !call_ids.is_empty() {
            for r in &self.records {
                if let Some(tcid) = &r.tool_call_id {
                    if call_ids.contains(tcid) {
                        doomed.insert(r.id.clone());
                    }
                }
            }
        }
        doomed
    }

    /// LLM-ready wire messages in window order.
    pub fn get_messages(&self) -> Vec<serde_json::Value> {
        self.records.iter().map(|r| r.to_wire()).collect()
    }

    /// All records in window order.
    pub fn get_items(&self) -> Vec<MessageRecord> {
        self.records.clone()
    }

    /// The most recent `n` records in window order.
    pub fn get_recent(&self, n: usize) -> Vec<MessageRecord> {
        let start = self.records.len().saturating_sub(n);
        self.records[start..].to_vec()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.current_tokens = 0;
    }

    pub fn token_usage(&self) -> usize {
        self.current_tokens
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Change the budget. Lowering it does not retroactively evict; the
    /// next append enforces the new bound.
    pub fn set_token_budget(&mut self, budget: usize) {
        self.token_budget = budget;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::counter::EstimateCounter;
    use mnemo_core::message::ToolCallDescriptor;
    use std::sync::Mutex;

    fn window(budget: usize) -> MessageWindow {
        MessageWindow::new(budget, Arc::new(EstimateCounter::new()))
    }

    fn sized(record: MessageRecord, tokens: usize) -> MessageRecord {
        record.with_token_count(tokens)
    }

    fn call(id: &str) -> ToolCallDescriptor {
        ToolCallDescriptor {
            id: id.into(),
            name: "lookup".into(),
            arguments: "{}".into(),
        }
    }

    #[test]
    fn append_within_budget_evicts_nothing() {
        let mut w = window(100);
        let evicted = w.append(sized(MessageRecord::user("hello"), 10));
        assert!(evicted.is_empty());
        assert_eq!(w.size(), 1);
        assert_eq!(w.token_usage(), 10);
    }

    #[test]
    fn oldest_non_system_evicted_first() {
        let mut w = window(20);
        w.append(sized(MessageRecord::system("rules"), 5));
        w.append(sized(MessageRecord::user("first"), 8));
        let evicted = w.append(sized(MessageRecord::user("second"), 10));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].content.as_text(), "first");
        assert!(w.token_usage() <= 20);
        // System record survives
        assert_eq!(w.get_items()[0].role, Role::System);
    }

    #[test]
    fn system_records_never_evicted() {
        let mut w = window(10);
        w.append(sized(MessageRecord::system("a"), 4));
        w.append(sized(MessageRecord::system("b"), 4));
        w.append(sized(MessageRecord::user("c"), 8));

        let roles: Vec<Role> = w.get_items().iter().map(|r| r.role).collect();
        assert!(roles.contains(&Role::System));
        assert_eq!(
            w.get_items().iter().filter(|r| r.role == Role::System).count(),
            2
        );
    }

    #[test]
    fn paired_eviction_assistant_takes_tool_results() {
        // Spec scenario: budget 20, system(5) + assistant/T1(6) + tool/T1(6)
        // + user(8) → assistant+tool leave together.
        let mut w = window(20);
        w.append(sized(MessageRecord::system("sys"), 5));
        w.append(sized(
            MessageRecord::assistant_with_tools(Content::Empty, vec![call("T1")]),
            6,
        ));
        w.append(sized(MessageRecord::tool_result("T1", "result"), 6));
        let evicted = w.append(sized(MessageRecord::user("next"), 8));

        assert_eq!(evicted.len(), 2);
        let roles: Vec<Role> = evicted.iter().map(|r| r.role).collect();
        assert!(roles.contains(&Role::Assistant));
        assert!(roles.contains(&Role::Tool));

        let remaining: Vec<Role> = w.get_items().iter().map(|r| r.role).collect();
        assert_eq!(remaining, vec![Role::System, Role::User]);
        assert_eq!(w.token_usage(), 13);
    }

    #[test]
    fn paired_eviction_tool_takes_owning_assistant() {
        let mut w = window(30);
        // Tool result lands before pressure; a filler user message is the
        // oldest but small enough that the tool record gets selected next.
        w.append(sized(MessageRecord::user("filler"), 2));
        w.append(sized(MessageRecord::tool_result("T9", "orphanable"), 10));
        w.append(sized(
            MessageRecord::assistant_with_tools(Content::Empty, vec![call("T9")]),
            10,
        ));
        let evicted = w.append(sized(MessageRecord::user("big message"), 20));

        // filler + tool + assistant all leave
        assert_eq!(evicted.len(), 3);
        assert_eq!(w.size(), 1);
        assert!(w.token_usage() <= 30);
    }

    #[test]
    fn multi_call_assistant_takes_all_results() {
        let mut w = window(24);
        w.append(sized(
            MessageRecord::assistant_with_tools(Content::Empty, vec![call("A"), call("B")]),
            6,
        ));
        w.append(sized(MessageRecord::tool_result("A", "ra"), 6));
        w.append(sized(MessageRecord::tool_result("B", "rb"), 6));
        let evicted = w.append(sized(MessageRecord::user("u"), 12));

        assert_eq!(evicted.len(), 3);
        assert_eq!(w.size(), 1);
        assert_eq!(w.get_items()[0].role, Role::User);
    }

    #[test]
    fn oversized_record_still_appended() {
        let mut w = window(10);
        w.append(sized(MessageRecord::user("small"), 5));
        let evicted = w.append(sized(MessageRecord::user("enormous"), 50));

        // Everything evictable went; the oversized record is the only one left.
        assert_eq!(evicted.len(), 1);
        assert_eq!(w.size(), 1);
        assert_eq!(w.get_items()[0].content.as_text(), "enormous");
        assert!(w.token_usage() > w.token_budget());
    }

    #[test]
    fn oversized_record_into_empty_window() {
        let mut w = window(10);
        let evicted = w.append(sized(MessageRecord::user("huge"), 99));
        assert!(evicted.is_empty());
        assert_eq!(w.size(), 1);
    }

    #[test]
    fn budget_reduction_is_not_retroactive() {
        let mut w = window(100);
        w.append(sized(MessageRecord::user("one"), 30));
        w.append(sized(MessageRecord::user("two"), 30));
        w.set_token_budget(10);
        assert_eq!(w.size(), 2);
        // Next append enforces the new budget
        let evicted = w.append(sized(MessageRecord::user("three"), 5));
        assert_eq!(evicted.len(), 2);
    }

    #[test]
    fn orphan_tool_result_appends_normally() {
        // The matching tool call was already evicted; the result is just a
        // plain tool message.
        let mut w = window(100);
        let evicted = w.append(sized(MessageRecord::tool_result("gone", "late result"), 5));
        assert!(evicted.is_empty());
        assert_eq!(w.size(), 1);
    }

    #[test]
    fn append_message_counts_tokens() {
        let mut w = window(100);
        w.append_message(Role::User, "12345678", None); // 2 tokens + 4 overhead
        assert_eq!(w.token_usage(), 6);

        w.append_message(Role::User, "x", Some(42));
        assert_eq!(w.token_usage(), 48);
    }

    #[test]
    fn get_messages_emits_wire_shape() {
        let mut w = window(100);
        w.append(sized(
            MessageRecord::assistant_with_tools(Content::Empty, vec![call("C1")]),
            5,
        ));
        let wire = w.get_messages();
        assert!(wire[0]["content"].is_null());
        assert_eq!(wire[0]["tool_calls"][0]["id"], "C1");
    }

    #[test]
    fn get_recent_returns_tail() {
        let mut w = window(1000);
        for i in 0..5 {
            w.append(sized(MessageRecord::user(format!("m{i}")), 5));
        }
        let recent = w.get_recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content.as_text(), "m3");
        assert_eq!(recent[1].content.as_text(), "m4");
    }

    #[test]
    fn eviction_hook_sees_batch() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let mut w = window(10);
        w.on_eviction(Box::new(move |records| {
            let mut guard = seen_clone.lock().unwrap();
            for r in records {
                guard.push(r.content.as_text());
            }
        }));

        w.append(sized(MessageRecord::user("old"), 8));
        w.append(sized(MessageRecord::user("new"), 8));
        assert_eq!(seen.lock().unwrap().as_slice(), ["old".to_string()]);
    }

    #[test]
    fn usage_never_exceeds_budget_after_normal_appends() {
        let mut w = window(40);
        for i in 0..20 {
            w.append(sized(MessageRecord::user(format!("msg {i}")), 7));
            assert!(w.token_usage() <= 40, "usage {} over budget", w.token_usage());
        }
    }

    #[test]
    fn clear_resets_usage() {
        let mut w = window(50);
        w.append(sized(MessageRecord::user("a"), 10));
        w.clear();
        assert_eq!(w.size(), 0);
        assert_eq!(w.token_usage(), 0);
    }
}
