mod poller;
mod reconciler;

pub use poller::{hostname_from_pid, MasterState, MembershipPoller, SlaveDescriptor};
pub use reconciler::{reconcile, sweep_unmonitored, ReconcileReport};
