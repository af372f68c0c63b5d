pub mod service;
pub mod wrapper;

pub use service::DispatchHandler;
pub use wrapper::{HttpServerWrapper, WrapperError, WrapperState};
