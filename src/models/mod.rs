pub mod handle;
pub mod messages;
pub mod document;
pub mod permissions;
pub mod user;
pub mod error;

pub use handle::*;
pub use messages::*;
pub use document::*;
pub use permissions::*;
pub use user::*;
pub use error::*;
