pub mod config;
pub mod humanize;
pub mod job;
pub mod notify;
pub mod observability;
pub mod parser;
pub mod retrieve;
pub mod scan;
pub mod stats;
pub mod storage;
pub mod store;
pub mod worker;
