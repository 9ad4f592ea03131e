pub(crate) mod abogus;
pub(crate) mod apis;
mod builder;

pub(crate) mod models;
pub(crate) mod utils;

pub use builder::URL_REGEX;
pub use builder::{Douyin, DouyinExtractorConfig};
