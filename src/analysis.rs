//! Conversation analysis: prompt, call, parse, validate.

pub mod analyzer;
pub mod types;

pub use analyzer::{AnalysisContext, Analyzer, ChatContext, TicketContext};
pub use types::{AnalysisMode, AnalysisResult, ChatSummary, TicketProblem};

use chrono::{DateTime, FixedOffset, Offset as _, Utc};

/// Render an instant as `YYYY-MM-DD HH:MM:SS (UTC±H)` in a whole-hour offset.
///
/// Offsets chrono rejects fall back to UTC.
pub fn format_local_time(instant: DateTime<Utc>, offset_hours: i32) -> String {
    let (offset, hours) = FixedOffset::east_opt(offset_hours.saturating_mul(3600))
        .map(|offset| (offset, offset_hours))
        .unwrap_or((Utc.fix(), 0));
    format!(
        "{} (UTC{hours:+})",
        instant.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S")
    )
}
