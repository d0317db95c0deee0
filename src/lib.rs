pub mod analyzer;
pub mod api;
pub mod config;
pub mod data_models;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod frequency;
pub mod mentions;
pub mod normalizer;
pub mod pipeline;
pub mod search;
pub mod stopwords;
pub mod store;
