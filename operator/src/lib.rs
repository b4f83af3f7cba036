pub mod apply;
pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod event;
pub mod finalizer;
pub mod leader;
pub mod manifest;
pub mod mapping;
pub mod metrics;
pub mod poll;
pub mod status;
pub mod tasks;
pub mod version;
pub mod webhook;

pub use error::{Error, Result};
