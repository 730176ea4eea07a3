//! Update primitives and the pending update list that batches them.

mod pending;
mod primitive;
mod put;

pub use pending::{AppliedUpdate, ApplyReport, MergeSummary, PendingUpdateList, PulState};
pub use primitive::{ApplyOutcome, UpdateKind, UpdateOp, UpdatePrimitive};
pub use put::Put;
