pub mod bundle;
pub mod error;
pub mod listener;
mod worker;

// Re-export core types
pub use bundle::{bundle, Bundle};
pub use error::{Cause, Error, Op};
pub use listener::{Address, Listener, ListenerRef, SharedListener};
