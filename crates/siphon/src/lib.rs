pub mod downloader;
pub mod error;
pub mod flv;
pub mod hls;
pub mod proxy;
mod utils;

pub use downloader::DownloaderConfig;
pub use error::DownloadError;
pub use flv::flv_downloader::{FlvDownloader, RawByteStream};
pub use hls::hls_downloader::HlsDownloader;
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
