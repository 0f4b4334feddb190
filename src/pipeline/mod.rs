mod analyze;
mod assemble;
mod classify;
mod confirm;
mod fields;
mod normalize;
mod resolve;
mod segment;

pub use analyze::DocumentType;
pub use assemble::ExtractionPipeline;
pub use confirm::confirm_records;
