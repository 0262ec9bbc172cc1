// src/utils/mod.rs
pub mod distance;
pub mod id_generator;
pub mod shared_init;

pub use distance::haversine_km;
