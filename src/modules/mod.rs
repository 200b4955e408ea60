//! Module resolution pipeline. Registry-backed, batched where the network is involved.
//!
//! 1. [`args`]: check caller values against a module's creation schema and encode them.
//! 2. [`registry`]: build and hold the per-network registry index.
//! 3. [`resolver`]: map deployed instances to descriptors via their identity marker.
//! 4. [`ruleset`]: classify leaf vs. chain instances and rebuild clause structure.
//! 5. [`params`]: read live parameter values from one instance.
pub mod args;
pub mod params;
pub mod registry;
pub mod resolver;
pub mod ruleset;

use canlog::{GetLogFilter, LogFilter, LogPriorityLevels};

#[derive(Clone, Copy, Debug, LogPriorityLevels)]
pub(crate) enum ModulesLogPriority {
    #[log_level(capacity = 2000, name = "MODULES_INFO")]
    Info,
    #[log_level(capacity = 500, name = "MODULES_WARN")]
    Warn,
}

impl GetLogFilter for ModulesLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}
