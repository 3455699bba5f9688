pub mod opensearch;

pub use opensearch::OpenSearchIndex;
