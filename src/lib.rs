pub mod cache;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod flock;
pub mod format;
pub mod model;
pub mod publish;
pub mod report;
pub mod repository;
pub mod resolver;
pub mod scope;
pub mod tree;

mod api;

pub use api::{Mvnfetch, MvnfetchBuilder};
