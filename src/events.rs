//! Notifications produced for code embedding the engine, and the ordered observer list.

use crate::cell::CellId;
use crate::error::SimResult;
use chemotaxis_common::Vec2;
use log::{debug, error, info};
use serde::Serialize;

/// Why a cell appeared, vanished or was swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleEvent {
    JustAppeared,
    Mitotic,
    Differentiated,
    Necrotic,
    Apoptotic,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellNotice {
    pub id: CellId,
    pub cell_type: usize,
    pub position: Vec2,
    pub event: LifecycleEvent,
}

/// Draw data for one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sprite {
    pub id: u64,
    pub cell_type: usize,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color: [u8; 3],
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub time: f32,
    pub tick: u64,
    pub sprites: Vec<Sprite>,
}

/// One row of the position log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRecord {
    pub time: f32,
    pub cell_type: String,
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub mean_weighted_activity: f32,
}

/// Subscriber to simulation notifications. All callbacks run on the simulation thread between
/// tick phases, in subscription order.
pub trait SimulationObserver: Send {
    fn cell_added(&mut self, _notice: &CellNotice) {}

    fn cell_removed(&mut self, _notice: &CellNotice) {}

    /// `old` was replaced by `new` (differentiation). Fired instead of removed + added.
    fn cell_replaced(&mut self, _old: &CellNotice, _new: &CellNotice) {}

    /// Rate-limited by wall clock.
    fn redraw(&mut self, _frame: &Frame) {}

    /// Once per output period of simulated time.
    fn write_to_file(&mut self, _time: f32, _records: &[PositionRecord]) -> SimResult<()> {
        Ok(())
    }

    /// Once, when the run ends for any reason.
    fn closed(&mut self, _time: f32) {}
}

/// Ordered list of observers.
#[derive(Default)]
pub struct Observers {
    list: Vec<Box<dyn SimulationObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn SimulationObserver>) {
        self.list.push(observer);
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn cell_added(&mut self, notice: &CellNotice) {
        self.list.iter_mut().for_each(|o| o.cell_added(notice));
    }

    pub fn cell_removed(&mut self, notice: &CellNotice) {
        self.list.iter_mut().for_each(|o| o.cell_removed(notice));
    }

    pub fn cell_replaced(&mut self, old: &CellNotice, new: &CellNotice) {
        self.list.iter_mut().for_each(|o| o.cell_replaced(old, new));
    }

    pub fn redraw(&mut self, frame: &Frame) {
        self.list.iter_mut().for_each(|o| o.redraw(frame));
    }

    /// Every observer is notified even if an earlier one fails. Returns the number of failures.
    pub fn write_to_file(&mut self, time: f32, records: &[PositionRecord]) -> usize {
        let mut failed = 0;
        for observer in &mut self.list {
            if let Err(e) = observer.write_to_file(time, records) {
                error!("Write-to-file notification failed at t = {:.3}: {}", time, e);
                failed += 1;
            }
        }
        failed
    }

    pub fn closed(&mut self, time: f32) {
        self.list.iter_mut().for_each(|o| o.closed(time));
    }
}

/// Logs lifecycle notifications through the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver;

impl SimulationObserver for LogObserver {
    fn cell_added(&mut self, notice: &CellNotice) {
        debug!(
            "Cell {} (type {}) added at ({:.1}, {:.1}): {:?}",
            notice.id.0, notice.cell_type, notice.position.x, notice.position.y, notice.event
        );
    }

    fn cell_removed(&mut self, notice: &CellNotice) {
        debug!("Cell {} removed: {:?}", notice.id.0, notice.event);
    }

    fn cell_replaced(&mut self, old: &CellNotice, new: &CellNotice) {
        debug!(
            "Cell {} (type {}) replaced by cell {} (type {})",
            old.id.0, old.cell_type, new.id.0, new.cell_type
        );
    }

    fn closed(&mut self, time: f32) {
        info!("Simulation closed at t = {:.3} min.", time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use std::sync::{Arc, Mutex};

    struct Writer {
        fail: bool,
        writes: Arc<Mutex<Vec<usize>>>,
    }

    impl SimulationObserver for Writer {
        fn write_to_file(&mut self, _time: f32, records: &[PositionRecord]) -> SimResult<()> {
            self.writes.lock().unwrap().push(records.len());
            if self.fail {
                return Err(SimError::fault(None, "writer", "disk full"));
            }
            Ok(())
        }
    }

    #[test]
    fn failing_writer_does_not_starve_later_observers() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::new();
        observers.subscribe(Box::new(Writer { fail: true, writes: Arc::clone(&writes) }));
        observers.subscribe(Box::new(Writer { fail: false, writes: Arc::clone(&writes) }));
        observers.subscribe(Box::new(Writer { fail: true, writes: Arc::clone(&writes) }));

        let record = PositionRecord {
            time: 1.0,
            cell_type: "amoeba".into(),
            id: 1,
            x: 0.0,
            y: 0.0,
            mean_weighted_activity: 0.0,
        };
        assert_eq!(observers.write_to_file(1.0, &[record]), 2);
        assert_eq!(*writes.lock().unwrap(), vec![1, 1, 1]);
    }
}
