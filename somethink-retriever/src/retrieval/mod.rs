pub mod extractor;
pub mod file_scanner;
pub mod indexing_engine;
pub mod indexing_state;
pub mod searcher;
pub mod topic_sync;
