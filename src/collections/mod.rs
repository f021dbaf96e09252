mod lru;
mod matrix;
mod ring;
mod trie;

pub use lru::*;
pub use matrix::*;
pub use ring::*;
pub use trie::*;
