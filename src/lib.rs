pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod processing {
    pub mod enhance;
    pub mod geometry;
    pub mod layout;
    pub mod pack;
    pub mod palette;
    pub mod pipeline;
    pub mod quantize;
}
pub mod rotation;
pub mod rotation_store;
pub mod schedule;
pub mod telemetry;
pub mod web;

pub use error::Error;
