pub mod editor;
pub mod channel;
pub mod controller;
pub mod editing_session;

pub use editor::*;
pub use channel::*;
pub use controller::*;
pub use editing_session::*;
