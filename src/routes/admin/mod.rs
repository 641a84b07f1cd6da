mod handler;
mod model;

pub use handler::{list_reports, resolve_report};
pub use model::{Report, ReportAction, ReportStatus};
