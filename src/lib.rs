pub mod authz;
pub mod config;
pub mod error;
pub mod files;
pub mod http;
pub mod models;
pub mod notifications;
pub mod preview;
pub mod requests;
pub mod search;
pub mod session;
mod storage;
#[cfg(test)]
mod test_backend;
pub mod users;

pub use authz::{RouteDecision, evaluate_route};
pub use config::Config;
pub use error::{ApiError, ApiErrorKind, ApiResult};
pub use http::ApiClient;
pub use models::{
    BorrowRequest, Category, FileRecord, NotificationRecord, RequestStatus, Role, SearchResults,
    UserProfile,
};
pub use notifications::{FeedPhase, FeedState, NotificationFeed};
pub use preview::DocumentPreview;
pub use search::SearchAggregator;
pub use session::{LoginOutcome, NavTarget, Navigator, Session, SessionStore};
