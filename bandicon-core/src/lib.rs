mod error;
mod id;
mod lineup;
mod transition;

pub use error::*;
pub use id::*;
pub use lineup::*;
pub use transition::*;

/// The type used for identifiers of users, rooms and slots.
pub type PrimaryKey = i32;
