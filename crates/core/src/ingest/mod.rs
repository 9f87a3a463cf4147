pub mod spreadsheet;

pub use spreadsheet::{load_inputs, load_inputs_blocking, IngestedInputs};
