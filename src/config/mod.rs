pub mod settings;

pub use settings::{KeyCacheKind, Settings};
