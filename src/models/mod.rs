//! Entity definitions persisted through the repository and lookup cache.

pub mod server;
pub mod server_member;
pub mod widget;

pub use server::Server;
pub use server_member::ServerMember;
pub use widget::Widget;
