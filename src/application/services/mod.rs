pub mod continuity_service;
pub mod session_list_service;
pub mod session_service;
pub mod sync_service;

pub use continuity_service::ContinuityService;
pub use session_list_service::{merge_sessions, SessionListService, SessionOverview};
pub use session_service::{RoundEntry, SessionService};
pub use sync_service::{SyncReport, SyncService};
