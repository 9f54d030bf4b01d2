pub mod charts;
pub mod csv_loader;
pub mod narrative;
pub mod summarizer;
