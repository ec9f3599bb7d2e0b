pub mod error;
pub mod http_remote;

pub use error::ApiError;
pub use http_remote::HttpRemoteApi;
