mod context;
mod headers;
mod inspector;
pub mod payload;

pub use context::VerifyFlags;
pub use headers::*;
pub use inspector::*;
