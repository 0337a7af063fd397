//! Greedy search over kernel interventions.
//!
//! Each round times the current winning kernel and every single-intervention
//! extension of it, each on a freshly built kernel. The "no change" option is
//! weighted by [`SearchConfig::stop_weight`]; a candidate has to beat it to be
//! appended to the winning sequence. The search stops when "no change" wins or
//! after [`SearchConfig::max_rounds`] rounds.
//!
//! A candidate that fails to lower, compile or run scores `+inf` and can never
//! win.

use std::rc::Rc;

use serde::Serialize;
use snafu::ResultExt;
use tessel_device::{Buffer, Device};
use tracing::{debug, trace};

use super::check::KernelCheck;
use super::config::SearchConfig;
use super::interventions::{apply_intervention, get_interventions};
use super::types::Intervention;
use crate::error::*;
use crate::kernel::{Ast, Kernel};

/// Outcome of [`search`]. Times are in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Winning sequence, in application order.
    pub interventions: Vec<Intervention>,
    /// Time of the untransformed kernel.
    pub baseline: f64,
    /// Time of the kernel with every winning intervention applied.
    pub best: f64,
    /// Rounds run, including the last one that chose to stop.
    pub rounds: usize,
    /// Best time after each accepted intervention, starting with the baseline.
    pub history: Vec<f64>,
}

impl SearchResult {
    pub fn speedup(&self) -> f64 {
        self.baseline / self.best
    }
}

/// Fresh kernel with `interventions` applied in order.
pub fn replay(ast: &Rc<Ast>, output: &Buffer, interventions: &[Intervention]) -> Result<Kernel> {
    let mut kernel = Kernel::new(ast, output.clone())?;
    for intervention in interventions {
        apply_intervention(&mut kernel, intervention)?;
    }
    Ok(kernel)
}

fn time_kernel(kernel: &Kernel, device: &dyn Device, runs: usize) -> Result<f64> {
    let compiled = kernel.codegen(device)?;
    let mut best = f64::INFINITY;
    for _ in 0..runs.max(1) {
        let event = compiled.run(kernel.bufs())?;
        device.synchronize().context(DeviceSnafu)?;
        best = best.min(event.elapsed(device.timing_scale()));
    }
    Ok(best)
}

/// Minimum time over `runs` launches, or `+inf` if anything fails.
pub fn run_and_time(kernel: &Kernel, device: &dyn Device, runs: usize) -> f64 {
    time_kernel(kernel, device, runs).unwrap_or_else(|error| {
        debug!(kernel = %kernel.name(), %error, "candidate failed");
        f64::INFINITY
    })
}

/// One search round: the best single intervention on top of `winning`, or
/// `None` when keeping the current kernel wins.
#[tracing::instrument(skip_all, fields(winning = winning.len()))]
pub fn search_one(
    ast: &Rc<Ast>,
    output: &Buffer,
    device: &dyn Device,
    winning: &[Intervention],
    config: &SearchConfig,
) -> Result<(f64, Option<Intervention>)> {
    let current = replay(ast, output, winning)?;
    let baseline = run_and_time(&current, device, config.runs);
    trace!(time = baseline, "no change");

    let mut best = (baseline, None, config.stop_weight);
    for candidate in get_interventions(&current) {
        let time = match replay(ast, output, winning).and_then(|mut kernel| {
            apply_intervention(&mut kernel, &candidate)?;
            Ok(kernel)
        }) {
            Ok(kernel) => run_and_time(&kernel, device, config.runs),
            Err(error) => {
                debug!(%candidate, %error, "candidate rejected");
                f64::INFINITY
            }
        };
        trace!(%candidate, time, "candidate");
        if time < best.0 * best.2 {
            best = (time, Some(candidate), 1.0);
        }
    }
    Ok((best.0, best.1))
}

/// Tune the kernel for `ast` on `device`.
///
/// Errors only when the AST itself cannot be lowered or the winning kernel
/// fails its final runs; `checker` panics if the winner computes something else.
#[tracing::instrument(skip_all, fields(ast = %ast))]
pub fn search(
    ast: &Rc<Ast>,
    device: &dyn Device,
    checker: &dyn KernelCheck,
    config: &SearchConfig,
) -> Result<SearchResult> {
    let output = device.alloc(Kernel::output_len(ast)?).context(DeviceSnafu)?;
    let baseline = run_and_time(&Kernel::new(ast, output.clone())?, device, config.runs);

    let mut interventions = Vec::new();
    let mut best = baseline;
    let mut history = vec![baseline];
    let mut rounds = 0;
    while rounds < config.max_rounds {
        rounds += 1;
        let (time, choice) = search_one(ast, &output, device, &interventions, config)?;
        debug!(round = rounds, time, choice = ?choice, "search round");
        let Some(choice) = choice else {
            break;
        };
        interventions.push(choice);
        best = time;
        history.push(best);
    }

    let kernel = replay(ast, &output, &interventions)?;
    for _ in 0..config.final_runs {
        kernel.codegen(device)?.run(kernel.bufs())?;
        device.synchronize().context(DeviceSnafu)?;
    }
    checker.check(&kernel, ast);

    debug!(
        interventions = ?interventions.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
        baseline_ms = baseline * 1e-6,
        best_ms = best * 1e-6,
        speedup = baseline / best,
        "search finished"
    );
    Ok(SearchResult { interventions, baseline, best, rounds, history })
}
