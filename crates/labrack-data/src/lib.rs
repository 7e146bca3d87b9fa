pub mod loader;
pub mod logging;
pub mod schema;

pub use loader::{DataLoadError, LabData, load_lab_data};
