//! Tool-dependency scheduler.
//!
//! Turns a flat batch of tool calls into an ordered sequence of [`Group`]s:
//! groups execute strictly in order, calls within a non-barrier group run
//! concurrently, and a barrier group runs alone. Ordering is derived from
//! three sources — a tool's `sequential` flag, a tool's `depends_on` list,
//! and a call's own `after` list — combined into a single DAG and drained
//! breadth-first, one ready set at a time.
//!
//! This is a **best-effort** orderer, not a constraint-proof: a cycle in
//! the declared dependencies does not deadlock scheduling, it degrades to
//! "no ordering guarantees for what's left" so that forward progress is
//! always made. Callers that care should check [`has_tool_dependencies`]
//! or [`has_call_dependencies`] up front and log when the cycle fallback
//! actually fires.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::{OrderedToolCall, Tool as _, ToolBox, ToolDescriptor, ToolExecutionResult};

/// One batch of tool calls to execute together, in scheduler order.
#[derive(Debug, Clone)]
pub struct Group {
    /// Calls in this group, in their original relative order.
    pub calls: Vec<OrderedToolCall>,
    /// When `true`, this group must run alone — no group before or after
    /// it may overlap with its execution.
    pub is_barrier: bool,
}

/// Compute execution-order groups for `calls` given the tool table `tools`.
///
/// A call whose `tool_name` is absent from `tools` is treated as a
/// dependency-free tool (`sequential: false`, `depends_on: []`).
#[must_use]
pub fn order_tool_calls(
    calls: &[OrderedToolCall],
    tools: &HashMap<String, ToolDescriptor>,
) -> Vec<Group> {
    if calls.is_empty() {
        return Vec::new();
    }

    let all_ids: HashSet<&str> = calls.iter().map(|c| c.tool_call_id.as_str()).collect();
    let all_tool_names: HashSet<&str> = calls.iter().map(|c| c.tool_name.as_str()).collect();

    let mut placed_ids: HashSet<&str> = HashSet::new();
    let mut placed_tools: HashSet<&str> = HashSet::new();
    let mut pending: Vec<usize> = (0..calls.len()).collect();
    let mut groups = Vec::new();

    while !pending.is_empty() {
        let ready: Vec<usize> = pending
            .iter()
            .copied()
            .filter(|&i| {
                is_ready(
                    &calls[i],
                    tools,
                    &all_ids,
                    &all_tool_names,
                    &placed_ids,
                    &placed_tools,
                )
            })
            .collect();

        if ready.is_empty() {
            tracing::warn!(
                remaining = pending.len(),
                "tool scheduler detected a dependency cycle; emitting remaining calls unordered"
            );
            let leftover = pending.iter().map(|&i| calls[i].clone()).collect();
            groups.push(Group {
                calls: leftover,
                is_barrier: false,
            });
            break;
        }

        let sequential_idx = ready
            .iter()
            .copied()
            .find(|&i| tools.get(&calls[i].tool_name).is_some_and(|d| d.sequential));

        if let Some(idx) = sequential_idx {
            placed_ids.insert(calls[idx].tool_call_id.as_str());
            placed_tools.insert(calls[idx].tool_name.as_str());
            groups.push(Group {
                calls: vec![calls[idx].clone()],
                is_barrier: true,
            });
            pending.retain(|&i| i != idx);
        } else {
            for &i in &ready {
                placed_ids.insert(calls[i].tool_call_id.as_str());
                placed_tools.insert(calls[i].tool_name.as_str());
            }
            groups.push(Group {
                calls: ready.iter().map(|&i| calls[i].clone()).collect(),
                is_barrier: false,
            });
            let ready_set: HashSet<usize> = ready.into_iter().collect();
            pending.retain(|i| !ready_set.contains(i));
        }
    }

    groups
}

#[allow(clippy::too_many_arguments)]
fn is_ready(
    call: &OrderedToolCall,
    tools: &HashMap<String, ToolDescriptor>,
    all_ids: &HashSet<&str>,
    all_tool_names: &HashSet<&str>,
    placed_ids: &HashSet<&str>,
    placed_tools: &HashSet<&str>,
) -> bool {
    let prereq_tools_satisfied = tools
        .get(&call.tool_name)
        .map(|d| d.depends_on.as_slice())
        .unwrap_or_default()
        .iter()
        .all(|prereq| !all_tool_names.contains(prereq.as_str()) || placed_tools.contains(prereq.as_str()));

    let prereq_calls_satisfied = call
        .after
        .iter()
        .all(|after_id| !all_ids.contains(after_id.as_str()) || placed_ids.contains(after_id.as_str()));

    prereq_tools_satisfied && prereq_calls_satisfied
}

/// `true` if any tool in `tools` is `sequential` or declares a `depends_on`.
///
/// Strategies may use this (together with [`has_call_dependencies`]) to
/// skip the scheduler entirely when a batch is trivially parallel.
#[must_use]
pub fn has_tool_dependencies(tools: &HashMap<String, ToolDescriptor>) -> bool {
    tools.values().any(|t| t.sequential || !t.depends_on.is_empty())
}

/// `true` if any call in `calls` declares a non-empty `after`.
#[must_use]
pub fn has_call_dependencies(calls: &[OrderedToolCall]) -> bool {
    calls.iter().any(|c| !c.after.is_empty())
}

/// Order `calls` via [`order_tool_calls`] and execute each group against
/// `tools`, awaiting every call in a group before advancing to the next.
///
/// A call whose tool is missing from `tools` yields an error result whose
/// message contains "not found"; a tool that returns `Err` yields an error
/// result carrying that message. Either way the group — and the overall
/// batch — keeps running; a failing call never cancels its siblings or
/// later groups.
pub async fn execute_ordered_tool_calls(
    calls: &[OrderedToolCall],
    tools: &ToolBox,
) -> Vec<ToolExecutionResult> {
    let descriptors = tools.descriptors();
    let groups = order_tool_calls(calls, &descriptors);

    let mut results = Vec::with_capacity(calls.len());
    for group in groups {
        let futures = group.calls.iter().map(|call| run_one(call, tools));
        results.extend(futures::future::join_all(futures).await);
    }
    results
}

async fn run_one(call: &OrderedToolCall, tools: &ToolBox) -> ToolExecutionResult {
    let started = Instant::now();
    let Some(tool) = tools.get(&call.tool_name) else {
        return ToolExecutionResult::err(
            &call.call,
            format!("tool '{}' not found", call.tool_name),
            started.elapsed(),
        );
    };

    match tool.run(call.arguments.clone()).await {
        Ok(value) => ToolExecutionResult::ok(&call.call, value, started.elapsed()),
        Err(message) => ToolExecutionResult::err(&call.call, message, started.elapsed()),
    }
}

/// Flatten a list of groups back into a single call sequence, in group
/// (then within-group) order. Used to check scheduler idempotence: feeding
/// this back through [`order_tool_calls`] should reproduce an equivalent
/// grouping, modulo groups merging when constraints allow it.
#[must_use]
pub fn flatten(groups: &[Group]) -> Vec<OrderedToolCall> {
    groups.iter().flat_map(|g| g.calls.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolCall;
    use serde_json::json;

    fn call(id: &str, tool: &str) -> OrderedToolCall {
        OrderedToolCall::new(ToolCall::new(id, tool, json!({})))
    }

    fn call_after(id: &str, tool: &str, after: &[&str]) -> OrderedToolCall {
        OrderedToolCall::with_after(
            ToolCall::new(id, tool, json!({})),
            after.iter().map(|s| (*s).to_owned()).collect(),
        )
    }

    #[test]
    fn empty_batch_produces_no_groups() {
        let tools = HashMap::new();
        assert!(order_tool_calls(&[], &tools).is_empty());
    }

    #[test]
    fn no_dependencies_is_one_parallel_group() {
        let tools = HashMap::new();
        let calls = vec![call("a", "alpha"), call("b", "beta")];
        let groups = order_tool_calls(&calls, &tools);
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_barrier);
        assert_eq!(groups[0].calls.len(), 2);
    }

    #[test]
    fn diamond_dependency_produces_two_groups() {
        // A, B run in parallel; D depends on both A and B.
        let mut tools = HashMap::new();
        tools.insert("A".to_owned(), ToolDescriptor::new("A", "", json!({})));
        tools.insert("B".to_owned(), ToolDescriptor::new("B", "", json!({})));
        tools.insert(
            "D".to_owned(),
            ToolDescriptor::new("D", "", json!({})).depends_on(["A", "B"]),
        );

        let calls = vec![call("a", "A"), call("b", "B"), call("d", "D")];
        let groups = order_tool_calls(&calls, &tools);

        assert_eq!(groups.len(), 2);
        assert!(!groups[0].is_barrier);
        assert_eq!(groups[0].calls.len(), 2);
        assert_eq!(groups[1].calls.len(), 1);
        assert_eq!(groups[1].calls[0].tool_call_id, "d");
    }

    #[test]
    fn sequential_tool_forces_its_own_barrier_per_call() {
        let mut tools = HashMap::new();
        tools.insert("A".to_owned(), ToolDescriptor::new("A", "", json!({})).sequential());
        tools.insert("B".to_owned(), ToolDescriptor::new("B", "", json!({})));
        tools.insert(
            "D".to_owned(),
            ToolDescriptor::new("D", "", json!({})).depends_on(["A", "B"]),
        );

        let calls = vec![call("a", "A"), call("b", "B"), call("d", "D")];
        let groups = order_tool_calls(&calls, &tools);

        assert_eq!(groups.len(), 3);
        assert!(groups[0].is_barrier);
        assert_eq!(groups[0].calls[0].tool_call_id, "a");
        assert!(!groups[1].is_barrier);
        assert_eq!(groups[1].calls[0].tool_call_id, "b");
        assert!(!groups[2].is_barrier);
        assert_eq!(groups[2].calls[0].tool_call_id, "d");
    }

    #[test]
    fn single_sequential_call_is_one_barrier_group() {
        let mut tools = HashMap::new();
        tools.insert("A".to_owned(), ToolDescriptor::new("A", "", json!({})).sequential());
        let calls = vec![call("a", "A")];
        let groups = order_tool_calls(&calls, &tools);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_barrier);
    }

    #[test]
    fn call_declared_after_is_respected() {
        let tools = HashMap::new();
        let calls = vec![call("a", "A"), call_after("b", "B", &["a"])];
        let groups = order_tool_calls(&calls, &tools);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].calls[0].tool_call_id, "a");
        assert_eq!(groups[1].calls[0].tool_call_id, "b");
    }

    #[test]
    fn after_referencing_unknown_id_is_vacuous() {
        let tools = HashMap::new();
        let calls = vec![call_after("a", "A", &["not-in-batch"])];
        let groups = order_tool_calls(&calls, &tools);
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_barrier);
    }

    #[test]
    fn depends_on_unknown_tool_is_vacuous() {
        let mut tools = HashMap::new();
        tools.insert(
            "D".to_owned(),
            ToolDescriptor::new("D", "", json!({})).depends_on(["not-called"]),
        );
        let calls = vec![call("d", "D")];
        let groups = order_tool_calls(&calls, &tools);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].calls.len(), 1);
    }

    #[test]
    fn unknown_tool_is_treated_as_dependency_free() {
        let tools = HashMap::new();
        let calls = vec![call("a", "mystery")];
        let groups = order_tool_calls(&calls, &tools);
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_barrier);
    }

    #[test]
    fn cyclic_call_dependencies_still_place_every_call() {
        let tools = HashMap::new();
        let calls = vec![call_after("a", "A", &["b"]), call_after("b", "B", &["a"])];
        let groups = order_tool_calls(&calls, &tools);

        let placed: HashSet<String> = flatten(&groups).into_iter().map(|c| c.tool_call_id).collect();
        assert_eq!(placed.len(), 2);
        assert!(placed.contains("a"));
        assert!(placed.contains("b"));
    }

    #[test]
    fn ordering_is_idempotent_up_to_group_merging() {
        let mut tools = HashMap::new();
        tools.insert("A".to_owned(), ToolDescriptor::new("A", "", json!({})));
        tools.insert("B".to_owned(), ToolDescriptor::new("B", "", json!({})));
        tools.insert(
            "D".to_owned(),
            ToolDescriptor::new("D", "", json!({})).depends_on(["A", "B"]),
        );

        let calls = vec![call("a", "A"), call("b", "B"), call("d", "D")];
        let first_pass = order_tool_calls(&calls, &tools);
        let flattened = flatten(&first_pass);
        let second_pass = order_tool_calls(&flattened, &tools);

        assert_eq!(flatten(&second_pass).len(), calls.len());
        assert_eq!(second_pass.len(), first_pass.len());
    }

    #[test]
    fn no_drop_or_duplication_for_an_arbitrary_batch() {
        let mut tools = HashMap::new();
        tools.insert("A".to_owned(), ToolDescriptor::new("A", "", json!({})).sequential());
        let calls = vec![call("a1", "A"), call("a2", "A"), call("b", "B")];
        let groups = order_tool_calls(&calls, &tools);
        let placed = flatten(&groups);
        assert_eq!(placed.len(), calls.len());
    }

    #[tokio::test]
    async fn execute_reports_missing_tool_as_not_found() {
        let tools = ToolBox::new();
        let calls = vec![call("a", "missing")];
        let results = execute_ordered_tool_calls(&calls, &tools).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert!(results[0].error.as_ref().unwrap().contains("not found"));
    }
}
