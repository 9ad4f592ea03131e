mod builder;
pub mod danmu;
pub(crate) mod danmu_models;
mod models;
pub mod tars;

pub use builder::Huya;
pub use builder::URL_REGEX;
pub use tars::*;

// Re-export the danmu provider
pub use danmu::HuyaDanmuProvider;
pub use danmu::create_huya_danmu_provider;

// Re-export danmu models for internal use
pub(crate) use danmu_models::*;
