mod ledger;
mod reducer;
mod sampling;

pub use ledger::{
    DuplicateStartPolicy, JobLedger, JobSnapshot, JobsHandle, ProgressOutcome,
};
pub use reducer::FailureCallback;
pub(crate) use reducer::JobReducer;
pub use sampling::ProgressSampler;
