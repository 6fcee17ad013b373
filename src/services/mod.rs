//! Request-side services

pub mod io;

pub use io::{ImageIngestion, NO_FILE_UPLOADED, NO_SELECTED_FILE};
