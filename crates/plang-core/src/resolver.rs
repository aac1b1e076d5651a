//! Static conflict analysis over a compiled module.
//!
//! `ConflictResolver::resolve` runs four passes in a fixed order (action,
//! priority, category, circular) and returns a fresh `Resolution`. Nothing
//! is carried between calls. Conflicts are warnings: the module is always
//! returned, with priorities rewritten so they are unique within each
//! category.
//!
//! The only IR mutation the resolver performs is the priority rewrite.
//! Breaking route cycles changes control flow, so it is left to the caller
//! through [`apply_cycle_breaks`].

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use plang_contracts::{
    conflict::{ConflictType, PolicyConflict},
    governance::{ActionType, GovernanceCategory},
    ir::{Instruction, IrModule},
};

use crate::graph::RouteGraph;

/// Number of entry-block instruction tags compared by the action pass.
pub const DEFAULT_SIGNATURE_DEPTH: usize = 3;

/// Result of one resolver run.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub module: IrModule,
    pub conflicts: Vec<PolicyConflict>,
}

impl Resolution {
    /// Unresolved conflicts with at least the given severity.
    pub fn blocking(&self, severity: u8) -> impl Iterator<Item = &PolicyConflict> {
        self.conflicts
            .iter()
            .filter(move |c| !c.resolved && c.severity >= severity)
    }

    pub fn of_type(&self, conflict_type: ConflictType) -> impl Iterator<Item = &PolicyConflict> {
        self.conflicts.iter().filter(move |c| c.conflict_type == conflict_type)
    }
}

#[derive(Debug, Clone)]
pub struct ConflictResolver {
    signature_depth: usize,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self { signature_depth: DEFAULT_SIGNATURE_DEPTH }
    }

    pub fn with_signature_depth(mut self, depth: usize) -> Self {
        self.signature_depth = depth;
        self
    }

    pub fn resolve(&self, module: IrModule) -> Resolution {
        let mut module = module;
        let mut conflicts = Vec::new();

        conflicts.extend(self.action_conflicts(&module));
        conflicts.extend(priority_conflicts(&mut module));
        conflicts.extend(category_conflicts(&module));
        conflicts.extend(circular_conflicts(&module));

        let unresolved = conflicts.iter().filter(|c| !c.resolved).count();
        info!(
            policies = module.len(),
            conflicts = conflicts.len(),
            unresolved,
            "conflict analysis complete"
        );
        Resolution { module, conflicts }
    }

    // ── ACTION ───────────────────────────────────────────────────────────────

    fn action_conflicts(&self, module: &IrModule) -> Vec<PolicyConflict> {
        let mut groups: Vec<(Vec<&'static str>, Vec<usize>)> = Vec::new();
        for (index, function) in module.iter().enumerate() {
            if function.strongest_action().is_none() {
                continue;
            }
            let signature = function.condition_signature(self.signature_depth);
            match groups.iter_mut().find(|(s, _)| *s == signature) {
                Some((_, members)) => members.push(index),
                None => groups.push((signature, vec![index])),
            }
        }

        let mut conflicts = Vec::new();
        for (signature, members) in groups {
            if members.len() < 2 {
                continue;
            }
            let action_sets: Vec<BTreeSet<u8>> = members
                .iter()
                .map(|&i| module.functions[i].actions().map(|a| a.action.precedence()).collect())
                .collect();
            if action_sets.windows(2).all(|w| w[0] == w[1]) {
                continue;
            }

            let ids: Vec<String> = members.iter().map(|&i| module.functions[i].id.clone()).collect();
            let mut emitted: BTreeSet<u8> = BTreeSet::new();
            for set in &action_sets {
                emitted.extend(set);
            }
            let emitted: Vec<&str> = emitted.iter().rev().filter_map(|&p| action_name(p)).collect();

            // Highest action precedence wins; declaration order breaks ties.
            let mut winner = members[0];
            for &candidate in &members[1..] {
                if strongest(module, candidate) > strongest(module, winner) {
                    winner = candidate;
                }
            }
            let winner_id = module.functions[winner].id.clone();
            let winning_action = module.functions[winner]
                .strongest_action()
                .map(ActionType::as_str)
                .unwrap_or("allow");

            let mut conflict = PolicyConflict::new(
                ConflictType::Action,
                ids.clone(),
                format!(
                    "policies {} share condition signature [{}] but emit different actions ({})",
                    ids.join(", "),
                    signature.join(", "),
                    emitted.join(", ")
                ),
            );
            conflict.resolve(
                Some(winner_id.clone()),
                format!("'{}' wins with {}, the highest action precedence", winner_id, winning_action),
            );
            debug!(policies = ?ids, winner = %winner_id, "action conflict");
            conflicts.push(conflict);
        }
        conflicts
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn strongest(module: &IrModule, index: usize) -> u8 {
    module.functions[index]
        .strongest_action()
        .map(ActionType::precedence)
        .unwrap_or(0)
}

fn action_name(precedence: u8) -> Option<&'static str> {
    [ActionType::Allow, ActionType::Route, ActionType::Escalate, ActionType::Deny]
        .into_iter()
        .find(|a| a.precedence() == precedence)
        .map(ActionType::as_str)
}

// ── PRIORITY ─────────────────────────────────────────────────────────────────

/// Detect shared `(category, priority)` pairs and rewrite them in place.
///
/// Members of a group are ordered by identifier; each takes the next free
/// priority at or above the shared value, offset by its rank. Values already
/// held by other policies of the category are skipped, so the rewrite never
/// introduces a new collision.
fn priority_conflicts(module: &mut IrModule) -> Vec<PolicyConflict> {
    let mut groups: Vec<((GovernanceCategory, i64), Vec<usize>)> = Vec::new();
    for (index, function) in module.iter().enumerate() {
        let key = (function.category(), function.priority());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(index),
            None => groups.push((key, vec![index])),
        }
    }

    let mut conflicts = Vec::new();
    for ((category, priority), mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|&a, &b| module.functions[a].id.cmp(&module.functions[b].id));

        let mut taken: BTreeSet<i64> = module
            .iter()
            .enumerate()
            .filter(|(i, f)| f.category() == category && !members.contains(i))
            .map(|(_, f)| f.priority())
            .collect();

        let ids: Vec<String> = members.iter().map(|&i| module.functions[i].id.clone()).collect();
        let mut assignments = Vec::with_capacity(members.len());
        let mut next = priority;
        for &index in &members {
            let assigned = next_free(&taken, next);
            taken.insert(assigned);
            module.functions[index].governance.priority = assigned;
            assignments.push(format!("{}={}", module.functions[index].id, assigned));
            next = assigned.checked_add(1).unwrap_or(assigned);
        }

        let mut conflict = PolicyConflict::new(
            ConflictType::Priority,
            ids.clone(),
            format!(
                "{} policies {} share priority {}",
                category,
                ids.join(", "),
                priority
            ),
        );
        conflict.resolve(
            ids.first().cloned(),
            format!("reassigned by identifier order: {}", assignments.join(", ")),
        );
        debug!(category = %category, priority, policies = ?ids, "priority conflict");
        conflicts.push(conflict);
    }
    conflicts
}

/// First value at or above `from` not in `taken`. When the range above is
/// exhausted at `i64::MAX`, the nearest free value below `from` is used.
fn next_free(taken: &BTreeSet<i64>, from: i64) -> i64 {
    let upward = std::iter::successors(Some(from), |v| v.checked_add(1));
    let downward = std::iter::successors(from.checked_sub(1), |v| v.checked_sub(1));
    upward
        .chain(downward)
        .find(|v| !taken.contains(v))
        .unwrap_or(from)
}

// ── CATEGORY ─────────────────────────────────────────────────────────────────

/// Pairs where a ROUTING or CUSTOM policy explicitly allows and a SAFETY
/// policy can deny. Only these category pairs are checked.
fn category_conflicts(module: &IrModule) -> Vec<PolicyConflict> {
    let mut conflicts = Vec::new();
    let allowing = module.iter().filter(|f| {
        matches!(f.category(), GovernanceCategory::Routing | GovernanceCategory::Custom)
            && f.can_emit(ActionType::Allow)
    });

    for low in allowing {
        for safety in module
            .iter()
            .filter(|f| f.category() == GovernanceCategory::Safety && f.can_emit(ActionType::Deny))
        {
            let mut conflict = PolicyConflict::new(
                ConflictType::Category,
                vec![low.id.clone(), safety.id.clone()],
                format!(
                    "{} policy '{}' allows but SAFETY policy '{}' can deny",
                    low.category(),
                    low.id,
                    safety.id
                ),
            );
            conflict.resolve(
                Some(safety.id.clone()),
                format!(
                    "SAFETY ({}) outranks {} ({}); a deny from '{}' ends evaluation before '{}' runs",
                    GovernanceCategory::Safety.precedence(),
                    low.category(),
                    low.category().precedence(),
                    safety.id,
                    low.id
                ),
            );
            debug!(allow = %low.id, deny = %safety.id, "category conflict");
            conflicts.push(conflict);
        }
    }
    conflicts
}

// ── CIRCULAR ─────────────────────────────────────────────────────────────────

/// Report the first route cycle of every connected component and verify the
/// proposed break.
///
/// The winner is the lowest-priority policy in the cycle (the later
/// declaration on ties). Its route to the next policy in the cycle is the
/// edge to remove. The break counts as resolved only when the component
/// becomes acyclic and every policy in it is still reachable, in the broken
/// graph, from the component's entry policies in the original graph. A
/// component with no entry policy is closed under routing; its walk starts at
/// the successor whose incoming route was removed.
fn circular_conflicts(module: &IrModule) -> Vec<PolicyConflict> {
    let graph = RouteGraph::from_module(module);
    let mut conflicts = Vec::new();

    for component in graph.components() {
        let Some(cycle) = graph.find_cycle(&component) else {
            continue;
        };

        let mut winner_at = 0;
        for (at, &node) in cycle.iter().enumerate() {
            let current = module.functions[cycle[winner_at]].priority();
            let candidate = module.functions[node].priority();
            if candidate < current || (candidate == current && node > cycle[winner_at]) {
                winner_at = at;
            }
        }
        let winner = cycle[winner_at];
        let successor = cycle[(winner_at + 1) % cycle.len()];

        let ids: Vec<String> = cycle.iter().map(|&n| graph.node(n).to_string()).collect();
        let mut loop_text = ids.join(" -> ");
        loop_text.push_str(" -> ");
        loop_text.push_str(&ids[0]);

        let broken = graph.without_edge(winner, successor);
        let acyclic = broken.find_cycle(&component).is_none();
        let mut roots = graph.entry_nodes(&component);
        if roots.is_empty() {
            roots.push(successor);
        }
        let reached = broken.reachable_from(&roots);
        let stranded: Vec<&str> = component
            .iter()
            .filter(|&&n| !reached[n])
            .map(|&n| graph.node(n))
            .collect();

        let winner_id = graph.node(winner).to_string();
        let edge = format!("{} -> {}", winner_id, graph.node(successor));
        let mut conflict = PolicyConflict::new(
            ConflictType::Circular,
            ids.clone(),
            format!("route cycle {}", loop_text),
        );

        let verdict = match (acyclic, stranded.is_empty()) {
            (true, true) => format!(
                "remove route {}: component becomes acyclic and all {} policies stay reachable",
                edge,
                component.len()
            ),
            (false, _) => format!("remove route {}: component still contains a cycle", edge),
            (true, false) => format!(
                "remove route {}: breaks the cycle but strands {}",
                edge,
                stranded.join(", ")
            ),
        };
        conflict.resolve(Some(winner_id.clone()), verdict);
        conflict.resolved = acyclic && stranded.is_empty();

        if conflict.resolved {
            debug!(cycle = %loop_text, winner = %winner_id, "circular conflict");
        } else {
            warn!(cycle = %loop_text, winner = %winner_id, "cycle break could not be verified");
        }
        conflicts.push(conflict);
    }
    conflicts
}

/// Apply the verified CIRCULAR resolutions to `module`.
///
/// Every `route to <successor>` in the winning policy becomes an ALLOW whose
/// reason names the removed route. Unverified breaks are left alone.
pub fn apply_cycle_breaks(module: IrModule, conflicts: &[PolicyConflict]) -> IrModule {
    let mut module = module;
    for conflict in conflicts {
        if conflict.conflict_type != ConflictType::Circular || !conflict.resolved {
            continue;
        }
        let Some(winner) = conflict.winner.as_deref() else {
            continue;
        };
        let Some(at) = conflict.policies.iter().position(|p| p == winner) else {
            continue;
        };
        let successor = conflict.policies[(at + 1) % conflict.policies.len()].clone();

        let Some(function) = module.get_mut(winner) else {
            continue;
        };
        let mut rewritten = 0;
        for instruction in function.blocks.iter_mut().flat_map(|b| b.instructions.iter_mut()) {
            if let Instruction::Action(action) = instruction {
                if action.action == ActionType::Route && action.target.as_deref() == Some(&successor) {
                    action.action = ActionType::Allow;
                    action.target = None;
                    action.reason = Some(format!("route to '{}' removed to break a cycle", successor));
                    rewritten += 1;
                }
            }
        }
        info!(policy = %winner, removed = %successor, rewritten, "applied cycle break");
    }
    module
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(source: &str) -> Resolution {
        ConflictResolver::new().resolve(plang_lang::build(&plang_lang::parse(source).unwrap()))
    }

    fn priorities_unique(module: &IrModule) -> bool {
        GovernanceCategory::ALL.iter().all(|&category| {
            let mut seen = BTreeSet::new();
            module
                .iter()
                .filter(|f| f.category() == category)
                .all(|f| seen.insert(f.priority()))
        })
    }

    // ── Action ────────────────────────────────────────────────────────────────

    #[test]
    fn allow_and_deny_with_same_signature_conflict() {
        let resolution = resolve("policy open: CUSTOM { allow }\npolicy shut: OPERATIONAL { deny }");
        let conflicts: Vec<_> = resolution.of_type(ConflictType::Action).collect();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].policies, vec!["open", "shut"]);
        assert_eq!(conflicts[0].winner.as_deref(), Some("shut"));
        assert_eq!(conflicts[0].severity, 70);
        assert!(conflicts[0].resolved);
    }

    #[test]
    fn same_actions_are_not_an_action_conflict() {
        let resolution = resolve("policy a: SAFETY { deny }\npolicy b: PRIVACY { deny \"x\" }");
        assert_eq!(resolution.of_type(ConflictType::Action).count(), 0);
    }

    #[test]
    fn different_signatures_do_not_conflict() {
        let resolution = resolve("policy a: CUSTOM { allow }\npolicy b: SAFETY { when x then deny }");
        assert_eq!(resolution.of_type(ConflictType::Action).count(), 0);
    }

    #[test]
    fn action_winner_tie_goes_to_first_declared() {
        let resolution = resolve(
            "policy x: CUSTOM { when a then deny }\npolicy y: CUSTOM { when b then deny else allow }",
        );
        let conflict = resolution.of_type(ConflictType::Action).next().unwrap();
        assert_eq!(conflict.winner.as_deref(), Some("x"));
    }

    // ── Priority ──────────────────────────────────────────────────────────────

    #[test]
    fn shared_priorities_are_rewritten_by_identifier_order() {
        let resolution = resolve(
            r#"
            policy zeta: SAFETY priority 5 { deny }
            policy alpha: SAFETY priority 5 { deny }
            policy mid: SAFETY priority 6 { deny }
            "#,
        );
        let conflicts: Vec<_> = resolution.of_type(ConflictType::Priority).collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].policies, vec!["alpha", "zeta"]);
        assert_eq!(conflicts[0].severity, 30);

        let module = &resolution.module;
        assert_eq!(module.get("alpha").unwrap().priority(), 5);
        assert_eq!(module.get("mid").unwrap().priority(), 6);
        assert_eq!(module.get("zeta").unwrap().priority(), 7);
        assert!(priorities_unique(module));
    }

    #[test]
    fn shared_priority_at_the_top_of_the_range_moves_down() {
        let resolution = resolve(
            r#"
            policy high: SAFETY priority 9223372036854775807 { deny }
            policy higher: SAFETY priority 9223372036854775807 { deny }
            policy below: SAFETY priority 9223372036854775806 { deny }
            "#,
        );
        assert_eq!(resolution.of_type(ConflictType::Priority).count(), 1);

        let module = &resolution.module;
        assert_eq!(module.get("high").unwrap().priority(), i64::MAX);
        assert_eq!(module.get("below").unwrap().priority(), i64::MAX - 1);
        assert_eq!(module.get("higher").unwrap().priority(), i64::MAX - 2);
        assert!(priorities_unique(module));
    }

    #[test]
    fn same_priority_in_different_categories_is_fine() {
        let resolution =
            resolve("policy a: SAFETY priority 1 { deny }\npolicy b: PRIVACY priority 1 { deny }");
        assert_eq!(resolution.of_type(ConflictType::Priority).count(), 0);
    }

    #[test]
    fn priority_rewrite_is_idempotent() {
        let first = resolve(
            r#"
            policy c: ROUTING priority 1 { allow }
            policy b: ROUTING priority 1 { allow }
            policy a: ROUTING priority 1 { allow }
            policy d: ROUTING priority 2 { allow }
            policy e: ROUTING priority 2 { allow }
            "#,
        );
        assert!(priorities_unique(&first.module));

        let second = ConflictResolver::new().resolve(first.module.clone());
        assert_eq!(second.of_type(ConflictType::Priority).count(), 0);
        assert_eq!(second.module, first.module);
    }

    // ── Category ──────────────────────────────────────────────────────────────

    #[test]
    fn routing_allow_against_safety_deny() {
        let resolution = resolve(
            r#"
            policy gate: SAFETY { when risky then deny }
            policy fallback: ROUTING { when ok then allow }
            policy misc: OPERATIONAL { when ok then allow }
            "#,
        );
        let conflicts: Vec<_> = resolution.of_type(ConflictType::Category).collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].policies, vec!["fallback", "gate"]);
        assert_eq!(conflicts[0].winner.as_deref(), Some("gate"));
        assert_eq!(conflicts[0].severity, 90);
    }

    #[test]
    fn implicit_allow_does_not_count() {
        let resolution =
            resolve("policy gate: SAFETY { deny }\npolicy r: ROUTING { when x then route to agent }");
        assert_eq!(resolution.of_type(ConflictType::Category).count(), 0);
    }

    // ── Circular ──────────────────────────────────────────────────────────────

    #[test]
    fn mutual_routes_report_exactly_one_cycle() {
        let resolution = resolve("policy a: ROUTING { route to b }\npolicy b: ROUTING { route to a }");
        let conflicts: Vec<_> = resolution.of_type(ConflictType::Circular).collect();

        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].involves("a") && conflicts[0].involves("b"));
        assert_eq!(conflicts[0].severity, 100);
        // a has the lower priority (declaration index 0)
        assert_eq!(conflicts[0].winner.as_deref(), Some("a"));
        assert!(conflicts[0].resolved);
        assert!(conflicts[0].resolution.as_deref().unwrap().contains("a -> b"));
    }

    #[test]
    fn resolver_does_not_rewrite_routes() {
        let resolution = resolve("policy a: ROUTING { route to b }\npolicy b: ROUTING { route to a }");
        let targets: Vec<&str> = resolution.module.get("a").unwrap().route_targets().collect();
        assert_eq!(targets, vec!["b"]);
    }

    #[test]
    fn unverifiable_break_is_left_unresolved() {
        // Two interlocked cycles: removing one edge leaves the other.
        let resolution = resolve(
            r#"
            policy a: ROUTING { when x then route to b else route to c }
            policy b: ROUTING { route to a }
            policy c: ROUTING { route to a }
            "#,
        );
        let conflicts: Vec<_> = resolution.of_type(ConflictType::Circular).collect();
        assert_eq!(conflicts.len(), 1);
        assert!(!conflicts[0].resolved);
        assert_eq!(resolution.blocking(100).count(), 1);
    }

    #[test]
    fn break_that_strands_a_policy_is_left_unresolved() {
        // x enters the cycle at a; cutting a -> b leaves b unreachable from x.
        let source = r#"
            policy a: ROUTING priority 1 { route to b }
            policy b: ROUTING priority 5 { route to a }
            policy x: ROUTING priority 9 { route to a }
        "#;
        let resolution = resolve(source);
        let conflicts: Vec<_> = resolution.of_type(ConflictType::Circular).collect();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].winner.as_deref(), Some("a"));
        assert!(!conflicts[0].resolved);
        assert!(conflicts[0].resolution.as_deref().unwrap().contains("strands b"));

        let module = apply_cycle_breaks(resolution.module.clone(), &resolution.conflicts);
        let a_targets: Vec<&str> = module.get("a").unwrap().route_targets().collect();
        assert_eq!(a_targets, vec!["b"]);
    }

    #[test]
    fn break_reachable_from_outside_entry_is_verified() {
        let resolution = resolve(
            r#"
            policy a: ROUTING priority 5 { route to b }
            policy b: ROUTING priority 1 { route to a }
            policy x: ROUTING priority 9 { route to a }
            "#,
        );
        let conflict = resolution.of_type(ConflictType::Circular).next().unwrap();
        assert_eq!(conflict.winner.as_deref(), Some("b"));
        assert!(conflict.resolved);
        assert!(conflict.resolution.as_deref().unwrap().contains("b -> a"));
    }

    #[test]
    fn one_cycle_per_component() {
        let resolution = resolve(
            r#"
            policy a: ROUTING { route to b }
            policy b: ROUTING { route to a }
            policy c: ROUTING { route to d }
            policy d: ROUTING { route to c }
            "#,
        );
        assert_eq!(resolution.of_type(ConflictType::Circular).count(), 2);
    }

    #[test]
    fn applying_breaks_removes_the_cycle() {
        let resolution = resolve("policy a: ROUTING { route to b }\npolicy b: ROUTING { route to a }");
        let module = apply_cycle_breaks(resolution.module.clone(), &resolution.conflicts);

        let a = module.get("a").unwrap();
        assert_eq!(a.route_targets().count(), 0);
        assert!(a.can_emit(ActionType::Allow));

        let again = ConflictResolver::new().resolve(module);
        assert_eq!(again.of_type(ConflictType::Circular).count(), 0);
    }

    // ── Purity ────────────────────────────────────────────────────────────────

    #[test]
    fn repeated_runs_are_independent() {
        let resolver = ConflictResolver::new();
        let source = "policy a: ROUTING { route to b }\npolicy b: ROUTING { route to a }";
        let module = plang_lang::build(&plang_lang::parse(source).unwrap());

        let first = resolver.resolve(module.clone());
        let second = resolver.resolve(module);
        assert_eq!(first.conflicts, second.conflicts);
    }
}
