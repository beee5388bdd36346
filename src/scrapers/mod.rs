pub mod browser;
pub mod cards;
pub mod http;
pub mod registry;
pub mod traits;
pub mod types;

pub use browser::ChromeSessionFactory;
pub use cards::{CardAdapter, CardSelectors};
pub use http::HttpSessionFactory;
pub use registry::AdapterRegistry;
pub use traits::{Session, SessionFactory, SourceAdapter};
pub use types::RawListing;
