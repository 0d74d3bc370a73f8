pub mod app;
pub mod commit;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod graph;
pub mod load;
pub mod output;
pub mod profile;
pub mod qc;
pub mod source;
pub mod sparql;
pub mod store;
pub mod tsv;
