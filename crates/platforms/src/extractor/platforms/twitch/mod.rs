mod builder;
pub mod danmu;
mod models;

pub use builder::Twitch;
pub use builder::URL_REGEX;
pub use danmu::{TwitchDanmuProtocol, TwitchDanmuProvider, create_twitch_danmu_provider};
