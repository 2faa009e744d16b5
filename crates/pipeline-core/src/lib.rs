pub mod audit;
pub mod collection;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod io;
pub mod item;
pub mod key;
pub mod ledger;
pub mod paths;
pub mod workflow;

pub use error::{PipelineError, Result};
