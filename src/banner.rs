//! Startup banner and session summary display.

use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};
use crate::proxy::transaction::Receipt;
use crate::scheduler::SchedulerStats;

/// Session configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub worker: &'a str,
    pub config: &'a str,
    pub mode: &'a str,
    pub processing_ms: u64,
    pub queue_limit: Option<usize>,
}

/// Print the startup banner with session info.
pub fn print_banner(info: &BannerInfo) {
    let queue_limit = info
        .queue_limit
        .map(|n| format_number(n as u64))
        .unwrap_or_else(|| "unbounded".to_string());
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║           S E R V I T O R             ║
   ║    one worker, many callers, in order ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   worker    {}
   config    {}
   mode      {}
   work      {} ms per transaction
   queue     {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.worker,
        info.config,
        info.mode,
        format_number(info.processing_ms),
        queue_limit,
    );
}

/// One line per receipt, in the order the worker processed them.
pub fn format_execution_order(ledger: &[Receipt]) -> String {
    ledger
        .iter()
        .map(|r| r.transaction_id.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Print the session summary (scheduler counters + farewell).
pub fn print_session_summary(stats: SchedulerStats) {
    println!(
        "session: {} submitted, {} executed, {} failed, {} rejected",
        format_number(stats.submitted),
        format_number(stats.executed),
        format_number(stats.failed),
        format_number(stats.rejected),
    );
    println!("goodbye.");
}
