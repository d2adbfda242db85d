pub mod conflicts;
pub mod emergency;
pub mod gate;
pub mod locks;
pub mod selection;

pub use conflicts::ConflictCheck;
pub use emergency::{
    BatchOperation, BatchOperationResult, BatchSummary, EmergencyAction, EmergencyService,
};
pub use gate::SelectionPeriod;
pub use locks::CourseLocks;
pub use selection::{MySelections, SelectionOutcome, SelectionService};
