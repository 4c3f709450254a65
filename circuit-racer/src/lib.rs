pub mod assets;
pub mod camera;
pub mod circuit;
pub mod circuit_format;
pub mod config;
pub mod controls;
pub mod debug;
pub mod race;
pub mod vehicle;
