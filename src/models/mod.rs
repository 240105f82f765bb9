// src/models/mod.rs
pub mod actor;
pub mod driver;
pub mod messages;
pub mod ride;
pub mod wallet;

pub use actor::*;
pub use driver::*;
pub use messages::*;
pub use ride::*;
pub use wallet::*;
