pub mod comment_bubbles;
pub mod config_loader;
pub mod data_service;
pub mod entity_reconciler;
pub mod field_normalizer;
pub mod image_preload;
pub mod image_ref;
pub mod result_cache;
pub mod reveal_flow;
pub mod reveal_seen;
pub mod session;
pub mod tabular_fetcher;
pub mod winners_resolver;
