//! Join plan execution.
//!
//! Every distinct table of a plan is loaded exactly once (with only its own
//! filters) on a small pool of scoped worker threads; the loaded frames are then
//! merged step by step on the calling thread.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::filters::FilterDescriptor;
use crate::loader::{LoadOptions, TableRequest, TableSource};
use crate::model::{pair_key, JoinKind, JoinPlan, JoinStep};

#[derive(Debug, Clone, Copy)]
pub struct JoinExecutor {
    concurrency: usize,
}

impl Default for JoinExecutor {
    fn default() -> Self { Self { concurrency: 4 } }
}

impl JoinExecutor {
    pub fn new(concurrency: usize) -> Self { Self { concurrency: concurrency.max(1) } }

    pub fn concurrency(&self) -> usize { self.concurrency }

    /// Load and merge the tables of `plan`.
    pub fn execute(
        &self,
        workflow_id: &str,
        plan: &JoinPlan,
        filters_by_dc: &HashMap<String, Vec<FilterDescriptor>>,
        source: &dyn TableSource,
        token: Option<&str>,
    ) -> EngineResult<DataFrame> {
        if plan.is_empty() {
            return Err(EngineError::invariant(format!("workflow '{}': join plan has no steps", workflow_id)));
        }
        let t0 = Instant::now();
        let ids = plan.table_ids();
        let mut tables = self.load_all(workflow_id, &ids, filters_by_dc, source, token)?;
        let t_load = t0.elapsed();

        let mut take = |id: &str| -> EngineResult<DataFrame> {
            tables.remove(id).ok_or_else(|| {
                EngineError::invariant(format!("workflow '{}': table '{}' was not loaded before merging", workflow_id, id))
            })
        };

        let mut pending: VecDeque<&JoinStep> = plan.steps.iter().collect();
        let first = pending.pop_front().ok_or_else(|| EngineError::invariant("join plan has no steps"))?;
        let seed = take(&first.left)?;
        let right = take(&first.right)?;
        let mut merged = merge_frames(workflow_id, seed, &first.left, right, &first.right, &first.on, first.kind)?;
        let mut used: HashSet<&str> = HashSet::from([first.left.as_str(), first.right.as_str()]);

        let mut stalled = 0usize;
        while let Some(step) = pending.pop_front() {
            let (has_left, has_right) = (used.contains(step.left.as_str()), used.contains(step.right.as_str()));
            match (has_left, has_right) {
                (true, true) => {
                    debug!(target: "dcjoin::executor", "execute: {} already merged, step skipped", pair_key(&step.left, &step.right));
                }
                (true, false) => {
                    let next = take(&step.right)?;
                    merged = merge_frames(workflow_id, merged, &step.left, next, &step.right, &step.on, step.kind)?;
                    used.insert(step.right.as_str());
                }
                (false, true) => {
                    let next = take(&step.left)?;
                    merged = merge_frames(workflow_id, merged, &step.right, next, &step.left, &step.on, step.kind.flipped())?;
                    used.insert(step.left.as_str());
                }
                (false, false) => {
                    pending.push_back(step);
                    stalled += 1;
                    if stalled > pending.len() {
                        let left: Vec<String> = pending.iter().map(|s| pair_key(&s.left, &s.right)).collect();
                        warn!(target: "dcjoin::executor", "execute: workflow='{}' plan is disconnected, unreachable steps {:?}", workflow_id, left);
                        return Err(EngineError::invariant(format!(
                            "workflow '{}': join plan is disconnected, steps {:?} never touch a merged table",
                            workflow_id, left
                        )));
                    }
                    continue;
                }
            }
            stalled = 0;
        }

        debug!(
            target: "dcjoin::executor",
            "execute: workflow='{}' tables={} steps={} rows={} cols={} load={:?} total={:?}",
            workflow_id,
            ids.len(),
            plan.steps.len(),
            merged.height(),
            merged.width(),
            t_load,
            t0.elapsed()
        );
        Ok(merged)
    }

    fn load_all(
        &self,
        workflow_id: &str,
        ids: &[String],
        filters_by_dc: &HashMap<String, Vec<FilterDescriptor>>,
        source: &dyn TableSource,
        token: Option<&str>,
    ) -> EngineResult<HashMap<String, DataFrame>> {
        let options = LoadOptions::default();
        let workers = self.concurrency.min(ids.len()).max(1);
        let next = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let results: Mutex<Vec<(usize, EngineResult<DataFrame>)>> = Mutex::new(Vec::with_capacity(ids.len()));

        thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    if failed.load(Ordering::Relaxed) { break; }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= ids.len() { break; }
                    let id = ids[i].as_str();
                    let filters = filters_by_dc.get(id).map(|v| v.as_slice()).unwrap_or(&[]);
                    let req = TableRequest { workflow_id, data_collection_id: id, filters, options: &options, token };
                    let r = source.load_table(&req);
                    if r.is_err() { failed.store(true, Ordering::Relaxed); }
                    results.lock().push((i, r));
                });
            }
        });

        let mut results = results.into_inner();
        results.sort_by_key(|(i, _)| *i);
        let mut out = HashMap::with_capacity(ids.len());
        for (i, r) in results {
            out.insert(ids[i].clone(), r?);
        }
        debug!(target: "dcjoin::executor", "load_all: workflow='{}' loaded {} tables with {} workers", workflow_id, out.len(), workers);
        Ok(out)
    }
}

/// Merge a list of frames on the columns each new frame shares with the
/// running result.
pub fn auto_merge(workflow_id: &str, tables: Vec<(String, DataFrame)>, kind: JoinKind) -> EngineResult<DataFrame> {
    let mut it = tables.into_iter();
    let (mut label, mut acc) = it.next().ok_or_else(|| EngineError::invariant("auto_merge called without tables"))?;
    for (id, df) in it {
        acc = merge_frames(workflow_id, acc, &label, df, &id, &[], kind)?;
        label = id;
    }
    Ok(acc)
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|c| c.to_string()).collect()
}

/// Join `new` (table `new_id`) onto `acc`. `anchor_id` names the already
/// merged side of the pair, for error context.
fn merge_frames(
    workflow_id: &str,
    acc: DataFrame,
    anchor_id: &str,
    new: DataFrame,
    new_id: &str,
    on: &[String],
    kind: JoinKind,
) -> EngineResult<DataFrame> {
    let subject = || format!("pair '{}'", pair_key(anchor_id, new_id));
    let ctx = || format!("merge of '{}' into '{}'", new_id, anchor_id);
    let acc_cols = column_names(&acc);
    let new_cols = column_names(&new);

    let keys: Vec<String> = if on.is_empty() {
        acc_cols.iter().filter(|c| new_cols.contains(c)).cloned().collect()
    } else {
        on.to_vec()
    };
    if keys.is_empty() {
        return Err(EngineError::configuration(workflow_id, subject(), "tables share no columns to merge on"));
    }
    for k in &keys {
        if !acc_cols.contains(k) {
            return Err(EngineError::configuration(workflow_id, subject(), format!("join column '{}' missing from '{}'", k, anchor_id)));
        }
        if !new_cols.contains(k) {
            return Err(EngineError::configuration(workflow_id, subject(), format!("join column '{}' missing from '{}'", k, new_id)));
        }
    }

    let mut right = new;
    for k in &keys {
        let want = acc.column(k).map_err(|e| EngineError::storage(ctx(), e))?.dtype().clone();
        let have = right.column(k).map_err(|e| EngineError::storage(ctx(), e))?.dtype().clone();
        if have != want {
            debug!(target: "dcjoin::executor", "merge: casting '{}'.{} from {:?} to {:?}", new_id, k, have, want);
            let casted = right.column(k).and_then(|c| c.cast(&want)).map_err(|e| EngineError::storage(ctx(), e))?;
            right.with_column(casted).map_err(|e| EngineError::storage(ctx(), e))?;
        }
    }

    for c in new_cols.iter().filter(|c| acc_cols.contains(c) && !keys.contains(c)) {
        let renamed = format!("{}_{}", c, new_id);
        right.rename(c, renamed.as_str().into()).map_err(|e| EngineError::storage(ctx(), e))?;
    }

    let args = JoinArgs::new(kind.to_polars()).with_coalesce(JoinCoalesce::CoalesceColumns);
    let out = acc
        .join(&right, keys.iter().map(String::as_str), keys.iter().map(String::as_str), args, None)
        .map_err(|e| EngineError::storage(ctx(), e))?;
    crate::tprintln!("merge {} ({}) on {:?}: {} rows x {} cols", pair_key(anchor_id, new_id), kind, keys, out.height(), out.width());
    Ok(out)
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod executor_tests;
