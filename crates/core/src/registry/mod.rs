//! Session/handle registry (spec §3, §4.1).

pub mod handle;
pub mod session;
pub mod sweeper;

pub use handle::{Handle, HandleRegistry};
pub use session::{Session, SessionRegistry};
pub use sweeper::Sweeper;
