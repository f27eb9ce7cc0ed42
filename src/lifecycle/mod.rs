mod engine;
mod status;
mod work_order;

pub use engine::{RepairPolicy, StatusEngine, Transition, TransitionTable};
pub use status::{DeliveryStatus, Domain, RepairStatus, Status};
pub use work_order::{
    AuditEntry, CompletionEvidence, TransitionEdge, TransitionOptions, Transitioned, WorkOrder,
};
