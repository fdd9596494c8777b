pub mod installed_set;

pub use installed_set::{InstalledSetStore, OwnedFileSet};
