//! The dedicated solver worker.
//!
//! One thread per network, running the tick pipeline at a fixed logical
//! period. The time factor compresses or stretches the wall-clock interval
//! while the logical step stays at the nominal period, so numerical
//! behavior is identical at any speed. While the host reports paused, the
//! worker idles without touching state. In-flight ticks always run to
//! completion; stopping joins at the next tick boundary.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use aeps_core::{ElecError, ElecResult, Network};

use crate::solver::{run_tick, Shared, SolverState, TICK_PERIOD_SECS};

/// Time factors below this are treated as this; zero would stall the loop.
const MIN_TIME_FACTOR: f64 = 1.0e-3;

pub(crate) struct WorkerHandle {
    join: JoinHandle<SolverState>,
}

impl WorkerHandle {
    /// Join the worker and recover the solver state. The running flag must
    /// already be cleared.
    pub fn join(self) -> SolverState {
        match self.join.join() {
            Ok(state) => state,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Spawn the solver worker, transferring ownership of the tick state.
pub(crate) fn spawn(
    network: Arc<Network>,
    shared: Arc<Shared>,
    mut st: SolverState,
) -> ElecResult<WorkerHandle> {
    let join = thread::Builder::new()
        .name("aeps-solver".into())
        .spawn(move || {
            info!("solver worker started");
            let mut next = Instant::now();
            while shared.running.load(Ordering::Acquire) {
                let time_factor = (*shared.controls.time_factor.lock()).max(MIN_TIME_FACTOR);
                let interval = Duration::from_secs_f64(TICK_PERIOD_SECS / time_factor);
                next += interval;

                if !shared.controls.paused.load(Ordering::Acquire) {
                    let started = Instant::now();
                    if let Err(fault) = run_tick(&network, &mut st, &shared, TICK_PERIOD_SECS) {
                        error!(%fault, "solver fault; worker stopping");
                        *shared.fault.lock() = Some(fault);
                        shared.running.store(false, Ordering::Release);
                        break;
                    }
                    let spent = started.elapsed();
                    debug!(?spent, "tick");
                    if spent > interval {
                        warn!(
                            ?spent,
                            ?interval,
                            "tick overran its period; solver is falling behind"
                        );
                    }
                }

                let now = Instant::now();
                if next > now {
                    thread::sleep(next - now);
                } else {
                    // Lost the schedule; restart it rather than bursting
                    next = now;
                }
            }
            info!("solver worker stopped");
            st
        })
        .map_err(|e| ElecError::Other(format!("failed to spawn solver worker: {}", e)))?;
    Ok(WorkerHandle { join })
}
