use std::fmt;

use crate::{
    addr::{AddressCodec, BinaryAddr, WordAddr},
    cache::SetIndex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Hit => write!(f, "HIT"),
            CacheStatus::Miss => write!(f, "miss"),
        }
    }
}

/// A cache line fetched from memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub tag: u32,
    pub index: SetIndex,
    pub words: Vec<WordAddr>,
}

/// One access of the reference stream.
#[derive(Debug, Clone)]
pub struct Reference {
    pub word_addr: WordAddr,
    pub bin_addr: BinaryAddr,
    pub tag: u32,
    pub index: SetIndex,
    pub offset: u32,
    /// `None` until the reference has been read into a cache.
    pub cache_status: Option<CacheStatus>,
}

impl Reference {
    pub fn new(word_addr: WordAddr, codec: &AddressCodec) -> Self {
        let fields = codec.decompose(word_addr);
        Self {
            word_addr,
            bin_addr: codec.binary(word_addr),
            tag: fields.tag,
            index: fields.index,
            offset: fields.offset,
            cache_status: None,
        }
    }
    /// fetches the block holding this reference from memory.
    pub fn get_cache_entry(&self, num_words_per_block: usize) -> Block {
        Block {
            tag: self.tag,
            index: self.index,
            words: self.word_addr.consecutive_words(num_words_per_block),
        }
    }
}
