pub mod cloudprovider;
pub mod config;
pub mod csi;
pub mod error;
pub mod estimator;
pub mod framework;
pub mod report;
pub mod resources;
pub mod state;
pub mod utils;
