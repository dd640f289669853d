pub mod bands;
pub mod capture;
pub mod decode;
pub mod estimator;
pub mod ingest;
pub mod normalizer;
pub mod params;
pub mod pipeline;
