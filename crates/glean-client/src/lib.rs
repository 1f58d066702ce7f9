#[cfg(feature = "browser")]
pub mod browser;
pub mod extractor;
pub mod json;
pub mod transport;

#[cfg(feature = "browser")]
pub use browser::BrowserRenderer;
pub use extractor::SelectorExtractor;
pub use transport::ReqwestTransport;
