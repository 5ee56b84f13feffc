//! Dedicated-thread execution of a simulation with cooperative pause/resume/cancel.

use crate::error::{SimError, SimResult};
use crate::simulation::{RunState, Simulation};
use log::{error, info};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Flags and progress shared between the run thread and its handle.
#[derive(Debug)]
pub struct RunControl {
    paused: AtomicBool,
    cancelled: AtomicBool,
    state: Mutex<RunState>,
    progress: AtomicU64,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            state: Mutex::new(RunState::Uninitialized),
            progress: AtomicU64::new(0),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Takes effect at the next tick boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Completed ticks.
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn set_progress(&self, ticks: u64) {
        self.progress.store(ticks, Ordering::Relaxed);
    }
}

pub struct SimulationRunner;

impl SimulationRunner {
    /// Moves `sim` onto its own thread and starts ticking.
    pub fn spawn(sim: Simulation) -> SimResult<RunHandle> {
        let control = Arc::new(RunControl::new());
        control.set_state(sim.state());
        let total_steps = sim.params().total_steps;
        let thread_control = Arc::clone(&control);
        let thread = std::thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || {
                let mut sim = sim;
                sim.run_to_completion(&thread_control)?;
                Ok(sim)
            })
            .map_err(|e| SimError::Initialization(format!("cannot start simulation thread: {}", e)))?;
        info!("Simulation thread started ({} steps).", total_steps);
        Ok(RunHandle { control, thread: Some(thread), total_steps })
    }
}

/// Caller-side handle to a running simulation.
pub struct RunHandle {
    control: Arc<RunControl>,
    thread: Option<JoinHandle<SimResult<Simulation>>>,
    total_steps: u64,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl RunHandle {
    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    /// (completed ticks, total ticks).
    pub fn progress(&self) -> (u64, u64) {
        (self.control.progress(), self.total_steps)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Waits for the run thread. Returns the closed simulation, or the fault that stopped it.
    /// A panic on the run thread is reported as a runtime fault.
    pub fn join(mut self) -> SimResult<Simulation> {
        let Some(thread) = self.thread.take() else {
            return Err(SimError::fault(None, "runner", "simulation thread already joined"));
        };
        match thread.join() {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Simulation thread panicked: {}", message);
                self.control.set_state(RunState::Faulted);
                Err(SimError::fault(None, "simulation thread", message))
            }
        }
    }
}
