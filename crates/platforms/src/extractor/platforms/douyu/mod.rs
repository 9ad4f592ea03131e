mod builder;
mod danmu;
mod danmu_models;
mod models;
mod stt;

pub use builder::Douyu;
pub use builder::URL_REGEX;
pub use danmu::{DouyuDanmuProtocol, DouyuDanmuProvider, create_douyu_danmu_provider};
