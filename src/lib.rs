// Library exports for Face Scan - expression and mental ability analyzer

pub mod camera;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod input;
pub mod models;
pub mod scoring;
pub mod session;
pub mod state;
pub mod ui;
