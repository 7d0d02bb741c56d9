pub mod app;
pub mod audio;
pub mod camera;
pub mod color;
pub mod config;
pub mod render;
pub mod scheduler;
pub mod settings;
pub mod sim;
pub mod snapshot;
pub mod sound;
pub mod terminal;
pub mod view;
