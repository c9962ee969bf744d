pub mod config;
pub mod error;
pub mod guard;
pub mod io;
pub mod paths;
pub mod session;
pub mod timestamp;
pub mod tracker;
pub mod update;
pub mod version;

pub use error::{KitError, Result};
