//! Orchestrator services: keyword input and JSON output

pub mod keyword_reader;
pub mod output_writer;

#[cfg(test)]
pub mod tests;

pub use keyword_reader::CsvKeywordReader;
pub use output_writer::JsonFileWriter;
