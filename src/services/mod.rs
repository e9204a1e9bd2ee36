pub mod features;
pub mod generator;
pub mod ingest;
pub mod parser;
pub mod predictor;
pub mod recommend;
pub mod registry;
pub mod scraper;
pub mod weather;
