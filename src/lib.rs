pub mod alphafold;
pub mod artifact;
pub mod config;
pub mod console;
pub mod domain;
pub mod enricher;
pub mod error;
pub mod fasta;
pub mod http;
pub mod lookup;
pub mod ncbi;
pub mod pipeline;
pub mod rate_limit;
pub mod report;
