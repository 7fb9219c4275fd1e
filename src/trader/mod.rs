pub mod advisory;
pub mod cycle;
pub mod simulate;
pub mod snapshot;

pub use advisory::Advice;
pub use cycle::{CycleOutcome, DailyTrader};
pub use simulate::SimulationReport;
pub use snapshot::{read_snapshot, write_snapshot, DecisionSnapshot, SnapshotInput};
