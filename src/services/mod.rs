pub mod csv_import;
pub mod id_generator;
pub mod product_map;

pub use csv_import::{CsvImporter, ImportOutcome, LedgerMirror};
pub use product_map::ProductMap;
