mod builder;
pub mod danmu;
mod models;

pub use builder::Twitcasting;
pub use builder::URL_REGEX;
pub use danmu::{
    TwitcastingDanmuProtocol, TwitcastingDanmuProvider, create_twitcasting_danmu_provider,
};
