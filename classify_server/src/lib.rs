//! Minimal library to run a teachable-machine image classifier on your webcam stream in the
//! browser.
pub mod canvas;
pub mod config;
pub mod controller;
pub mod endpoints;
pub mod meter;
pub mod nn;
pub mod page;
pub mod sensors;
pub mod utils;
