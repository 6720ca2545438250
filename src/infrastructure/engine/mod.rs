mod http;
mod in_memory;

pub use http::HttpSearchEngine;
pub use in_memory::InMemorySearchEngine;
