pub mod action;
pub mod cache_entry;
pub mod player;
pub mod recent_session;
pub mod score;
pub mod session;

pub use action::{
    CreateSessionPayload, JoinSessionPayload, OfflineAction, ScorePayload, UpdateSessionPayload,
};
pub use cache_entry::CacheEntry;
pub use player::OfflinePlayer;
pub use recent_session::RecentSession;
pub use score::OfflineScore;
pub use session::{NewOfflineSession, OfflineSession, SessionPatch};
