//! Huya TARS protocol types and codec functions

mod codec;
mod responses;
mod stream;
mod types;

pub use codec::*;
pub use responses::*;
pub use stream::*;
pub use types::*;
