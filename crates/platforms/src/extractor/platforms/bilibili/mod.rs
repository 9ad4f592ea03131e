mod builder;
mod models;
mod utils;
mod wbi;

pub use builder::Bilibili;
pub use builder::BilibiliQuality;
pub use builder::URL_REGEX;
pub use utils::generate_fake_buvid3;
