//! Join graph resolution.
//!
//! Participating data collections are grouped into connected components of
//! the declared join relation, and each component gets a plan whose steps can
//! be executed in order (every step after the first touches an already merged
//! table).

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::config::GapFillPolicy;
use crate::error::{EngineError, EngineResult};
use crate::model::{pair_key, JoinDeclaration, JoinGroup, JoinPlan, JoinStep};

mod union_find;

pub use union_find::{IdArena, UnionFind};

/// The group holding the requested table, plus the participants that could
/// not be attached to it (only populated under `GapFillPolicy::Ignore`).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSelection {
    pub group: JoinGroup,
    pub detached: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JoinGraphResolver {
    gap_fill: GapFillPolicy,
}

impl JoinGraphResolver {
    pub fn new(gap_fill: GapFillPolicy) -> Self { Self { gap_fill } }

    pub fn gap_fill(&self) -> GapFillPolicy { self.gap_fill }

    /// Partition `participants` into join groups using the declarations of
    /// `catalog` whose both endpoints participate. Groups are sorted by key.
    pub fn resolve(&self, workflow_id: &str, participants: &[String], catalog: &[JoinDeclaration]) -> Vec<JoinGroup> {
        let mut arena = IdArena::default();
        for p in participants { arena.intern(p); }

        let mut universe: HashSet<String> = HashSet::new();
        for i in 0..arena.len() {
            for j in (i + 1)..arena.len() {
                universe.insert(pair_key(arena.id(i), arena.id(j)));
                universe.insert(pair_key(arena.id(j), arena.id(i)));
            }
        }
        let observed: Vec<&JoinDeclaration> = catalog.iter().filter(|d| universe.contains(&d.pair_key())).collect();

        let mut uf = UnionFind::new(arena.len());
        let mut merges = 0usize;
        for d in &observed {
            if let (Some(a), Some(b)) = (arena.get(&d.left), arena.get(&d.right)) {
                if uf.union(a, b) { merges += 1; }
            }
        }

        let mut by_root: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for i in 0..arena.len() {
            let r = uf.find(i);
            by_root.entry(r).or_default().push(arena.id(i).to_string());
        }

        let mut groups: Vec<JoinGroup> = by_root
            .into_values()
            .map(|mut members| {
                members.sort();
                let plan = plan_for_members(&members, &observed);
                JoinGroup { members, plan }
            })
            .collect();
        groups.sort_by(|a, b| a.members.cmp(&b.members));

        debug!(
            target: "dcjoin::resolver",
            "resolve: workflow='{}' participants={} observed_joins={} merges={} groups={:?}",
            workflow_id,
            arena.len(),
            observed.len(),
            merges,
            groups.iter().map(|g| g.key()).collect::<Vec<_>>()
        );
        groups
    }

    /// Pick the group containing `target` and deal with participants that no
    /// declaration connects to it, according to the gap-fill policy.
    pub fn select_group(
        &self,
        workflow_id: &str,
        target: &str,
        groups: Vec<JoinGroup>,
        catalog: &[JoinDeclaration],
    ) -> EngineResult<GroupSelection> {
        let (mut mine, others): (Vec<JoinGroup>, Vec<JoinGroup>) = groups.into_iter().partition(|g| g.contains(target));
        let mut group = mine
            .pop()
            .ok_or_else(|| EngineError::invariant(format!("data collection '{}' is missing from its own join resolution", target)))?;
        if others.is_empty() {
            return Ok(GroupSelection { group, detached: Vec::new() });
        }

        match self.gap_fill {
            GapFillPolicy::Reject => {
                let other = &others[0].members[0];
                Err(EngineError::configuration(
                    workflow_id,
                    format!("pair '{}'", pair_key(target, other)),
                    format!("no join declared between '{}' and '{}', directly or through other filtered data collections", target, other),
                ))
            }
            GapFillPolicy::Ignore => {
                let detached: Vec<String> = others.into_iter().flat_map(|g| g.members).collect();
                warn!(target: "dcjoin::resolver", "workflow='{}' target='{}': no join path to {:?}; their filters are ignored", workflow_id, target, detached);
                Ok(GroupSelection { group, detached })
            }
            GapFillPolicy::ReuseKnownDeclaration => {
                let template = catalog.first().ok_or_else(|| {
                    EngineError::configuration(workflow_id, format!("data collection '{}'", target), "no join declaration available to fill join gaps")
                })?;
                let mut steps = group.plan.steps;
                for other in others {
                    let bridge_to = other.members[0].clone();
                    warn!(
                        target: "dcjoin::resolver",
                        "workflow='{}': synthesizing placeholder join {} ({} on {:?}) copied from '{}'",
                        workflow_id,
                        pair_key(target, &bridge_to),
                        template.kind,
                        template.on,
                        template.pair_key()
                    );
                    steps.push(JoinStep { left: target.to_string(), right: bridge_to, kind: template.kind, on: template.on.clone(), placeholder: true });
                    steps.extend(other.plan.steps);
                    group.members.extend(other.members);
                }
                group.members.sort();
                group.plan = JoinPlan { steps: executable_order(steps) };
                Ok(GroupSelection { group, detached: Vec::new() })
            }
        }
    }
}

fn plan_for_members(members: &[String], observed: &[&JoinDeclaration]) -> JoinPlan {
    let inside = |id: &str| members.iter().any(|m| m == id);
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut steps: Vec<JoinStep> = Vec::new();
    for d in observed {
        if !(inside(&d.left) && inside(&d.right)) { continue; }
        if !seen.insert(d.unordered_key()) { continue; }
        steps.push(JoinStep::from(*d));
    }
    JoinPlan { steps: executable_order(steps) }
}

/// Stable reorder so that every step after the first references a table an
/// earlier step already brought in. Steps that can never connect keep their
/// relative order at the end.
pub fn executable_order(steps: Vec<JoinStep>) -> Vec<JoinStep> {
    let mut pending = steps;
    if pending.is_empty() { return pending; }
    let mut out: Vec<JoinStep> = Vec::with_capacity(pending.len());
    let mut merged: HashSet<String> = HashSet::new();
    let first = pending.remove(0);
    merged.insert(first.left.clone());
    merged.insert(first.right.clone());
    out.push(first);
    while let Some(i) = pending.iter().position(|s| merged.contains(&s.left) || merged.contains(&s.right)) {
        let s = pending.remove(i);
        merged.insert(s.left.clone());
        merged.insert(s.right.clone());
        out.push(s);
    }
    out.extend(pending);
    out
}
