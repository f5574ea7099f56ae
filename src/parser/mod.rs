pub mod profile_reader;
pub mod string_table;

// Re-export key types from the parser module
pub use profile_reader::SampleProfileReader;
pub use string_table::{StringTable, Symbol};
