pub mod path_resolver;
pub mod sync_service;

pub use path_resolver::PathResolver;
pub use sync_service::{SyncReport, SyncService};
