//! Command execution against per-platform execution services.
//!
//! ## Dispatcher
//! `CommandDispatcher` posts each `place_order` command to the
//! `{base_url}/trade` endpoint of the service selected by the command's
//! platform. Failures are logged per command and never abort the batch.

mod dispatcher;

pub use dispatcher::{CommandDispatcher, TradeRequest};

use crate::model::Command;
use async_trait::async_trait;
use std::ops::AddAssign;

/// Outcome counts for one `execute_commands` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Accepted by the execution service (HTTP 200)
    pub placed: usize,
    /// Rejected, unreachable, or not routable
    pub failed: usize,
    /// Command kinds the dispatcher does not handle yet
    pub unimplemented: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.placed + self.failed + self.unimplemented
    }
}

impl AddAssign for DispatchReport {
    fn add_assign(&mut self, other: Self) {
        self.placed += other.placed;
        self.failed += other.failed;
        self.unimplemented += other.unimplemented;
    }
}

/// Executes strategy commands. Best effort: never fails the caller.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `commands` sequentially, in order.
    async fn execute_commands(&self, commands: &[Command]) -> DispatchReport;
}
