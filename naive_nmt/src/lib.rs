pub mod config;
pub mod dataset;
pub mod embedding;
pub mod embedding_matrix;
pub mod error;
pub mod hparams;
pub mod pretrained;
pub mod vocabulary;

pub use error::{NmtError, Result};
