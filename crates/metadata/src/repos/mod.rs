//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod conflicts;
pub mod devices;
pub mod orphans;
pub mod photos;
pub mod sync;
pub mod users;

pub use bootstrap::BootstrapRepo;
pub use conflicts::{ConflictFilter, ConflictRepo};
pub use devices::DeviceRepo;
pub use orphans::{OrphanAssignment, OrphanFilter, OrphanRepo};
pub use photos::PhotoRepo;
pub use sync::{FeedPosition, SyncRepo};
pub use users::UserRepo;
