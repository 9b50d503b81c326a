mod api_key;
mod application;
mod audit_log;
mod license;
mod pagination;

pub use api_key::*;
pub use application::*;
pub use audit_log::*;
pub use license::*;
pub use pagination::*;
