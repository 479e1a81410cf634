pub mod listing;
pub mod nft;

pub use listing::*;
pub use nft::*;
