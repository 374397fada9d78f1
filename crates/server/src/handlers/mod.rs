//! HTTP request handlers.

pub mod common;
pub mod conflicts;
pub mod health;
pub mod orphans;
pub mod photos;
pub mod scanner;
pub mod sync;
pub mod thumbnails;
pub mod users;

pub use conflicts::*;
pub use health::*;
pub use orphans::*;
pub use photos::*;
pub use scanner::*;
pub use sync::*;
pub use thumbnails::*;
pub use users::*;
