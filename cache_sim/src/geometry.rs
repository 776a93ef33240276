use thiserror::Error;

use crate::addr::{AddressCodec, WordAddr};

/// Shape of a cache. Sizes are counted in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    pub cache_size: usize,
    pub num_blocks_per_set: usize,
    pub num_words_per_block: usize,
    pub num_addr_bits: u32,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GeometryError {
    #[error("{name} must be positive")]
    Zero { name: &'static str },
    #[error("{name} must be a power of two, got {value}")]
    NotPowerOfTwo { name: &'static str, value: usize },
    #[error("cache size {cache_size} is not a multiple of the block size {num_words_per_block}")]
    PartialBlock {
        cache_size: usize,
        num_words_per_block: usize,
    },
    #[error("{num_blocks} blocks cannot be grouped into sets of {num_blocks_per_set}")]
    PartialSet {
        num_blocks: usize,
        num_blocks_per_set: usize,
    },
    #[error("addresses wider than 32 bits are not supported, got {0}")]
    AddrTooWide(u32),
}

pub type Result<T> = std::result::Result<T, GeometryError>;

fn ensure_positive(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        Err(GeometryError::Zero { name })
    } else {
        Ok(())
    }
}

fn ensure_power_of_two(name: &'static str, value: usize) -> Result<()> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(GeometryError::NotPowerOfTwo { name, value })
    }
}

impl CacheGeometry {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("cache size", self.cache_size)?;
        ensure_positive("number of blocks per set", self.num_blocks_per_set)?;
        ensure_positive("number of words per block", self.num_words_per_block)?;
        ensure_power_of_two("number of words per block", self.num_words_per_block)?;
        if self.cache_size % self.num_words_per_block != 0 {
            return Err(GeometryError::PartialBlock {
                cache_size: self.cache_size,
                num_words_per_block: self.num_words_per_block,
            });
        }
        let num_blocks = self.num_blocks();
        if num_blocks % self.num_blocks_per_set != 0 {
            return Err(GeometryError::PartialSet {
                num_blocks,
                num_blocks_per_set: self.num_blocks_per_set,
            });
        }
        ensure_power_of_two("number of sets", self.num_sets())?;
        if self.num_addr_bits > u32::BITS {
            return Err(GeometryError::AddrTooWide(self.num_addr_bits));
        }
        Ok(())
    }
    pub fn num_blocks(&self) -> usize {
        self.cache_size / self.num_words_per_block
    }
    pub fn num_sets(&self) -> usize {
        self.num_blocks() / self.num_blocks_per_set
    }
    pub fn num_offset_bits(&self) -> u32 {
        self.num_words_per_block.trailing_zeros()
    }
    pub fn num_index_bits(&self) -> u32 {
        self.num_sets().trailing_zeros()
    }
    pub fn num_tag_bits(&self) -> u32 {
        self.codec().num_tag_bits()
    }
    /// widens the address so that `max_addr` and the index and offset fields
    /// fit in it.
    pub fn fit_addr_bits(&mut self, max_addr: WordAddr) {
        let required = self.num_index_bits() + self.num_offset_bits();
        self.num_addr_bits = self
            .num_addr_bits
            .max(max_addr.bit_length())
            .max(required);
    }
    pub fn codec(&self) -> AddressCodec {
        AddressCodec::new(
            self.num_addr_bits,
            self.num_index_bits(),
            self.num_offset_bits(),
        )
    }
}
