// src/models/mod.rs
pub mod geofence;
pub mod notification;
pub mod order;

pub use geofence::*;
pub use notification::*;
pub use order::*;
