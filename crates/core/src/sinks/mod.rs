pub mod csv_file;
pub mod postgrest;

pub use csv_file::{CsvFallbackSink, FALLBACK_HEADER};
pub use postgrest::PostgrestSink;
