//! Word addresses and their split into tag, index and offset fields

use std::fmt;

use crate::cache::SetIndex;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WordAddr(u32);

impl WordAddr {
    pub fn new(v: u32) -> Self {
        Self(v)
    }
    pub fn inner(self) -> u32 {
        self.0
    }
    /// number of bits needed to write this address in binary.
    pub fn bit_length(self) -> u32 {
        u32::BITS - self.0.leading_zeros()
    }
    /// all word addresses of the block which contains this address.
    pub fn consecutive_words(self, num_words_per_block: usize) -> Vec<WordAddr> {
        let len = num_words_per_block as u32;
        let base = self.0 - self.0 % len;
        (base..=base.saturating_add(len - 1)).map(WordAddr).collect()
    }
}

impl fmt::Display for WordAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// zero-padded binary form of a word address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryAddr {
    value: u32,
    num_bits: u32,
}

impl BinaryAddr {
    pub fn new(addr: WordAddr, num_bits: u32) -> Self {
        Self {
            value: addr.inner(),
            num_bits,
        }
    }
}

impl fmt::Display for BinaryAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.num_bits as usize;
        write!(f, "{:0width$b}", self.value)
    }
}

#[inline]
pub const fn bit_mask(num_bits: u32) -> u32 {
    if num_bits >= u32::BITS {
        u32::MAX
    } else {
        (1 << num_bits) - 1
    }
}

/// extracts `num_bits` bits of `bin` starting at bit `start`.
#[inline]
pub const fn extract(bin: u32, start: u32, num_bits: u32) -> u32 {
    if start >= u32::BITS {
        0
    } else {
        (bin >> start) & bit_mask(num_bits)
    }
}

/// Decoded fields of a single word address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrFields {
    pub tag: u32,
    pub index: SetIndex,
    pub offset: u32,
}

/// Splits word addresses according to the bit widths of a cache geometry.
///
/// The low `num_offset_bits` select the word within a block, the next
/// `num_index_bits` select the set and the remaining bits form the tag.
/// A cache without index bits is fully associative.
///
/// ```
/// use cache_sim::{addr::{AddressCodec, WordAddr}, cache::SetIndex};
///
/// let codec = AddressCodec::new(8, 1, 1);
/// let fields = codec.decompose(WordAddr::new(0b1011));
/// assert_eq!(fields.offset, 1);
/// assert_eq!(fields.index, SetIndex::Indexed(1));
/// assert_eq!(fields.tag, 0b10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCodec {
    num_addr_bits: u32,
    num_index_bits: u32,
    num_offset_bits: u32,
}

impl AddressCodec {
    pub fn new(num_addr_bits: u32, num_index_bits: u32, num_offset_bits: u32) -> Self {
        Self {
            num_addr_bits,
            num_index_bits,
            num_offset_bits,
        }
    }
    pub fn num_index_bits(&self) -> u32 {
        self.num_index_bits
    }
    pub fn num_offset_bits(&self) -> u32 {
        self.num_offset_bits
    }
    pub fn num_tag_bits(&self) -> u32 {
        self.num_addr_bits
            .saturating_sub(self.num_index_bits + self.num_offset_bits)
    }
    pub fn decompose(&self, addr: WordAddr) -> AddrFields {
        let bin = addr.inner();
        let offset = extract(bin, 0, self.num_offset_bits);
        let index = extract(bin, self.num_offset_bits, self.num_index_bits);
        let tag = extract(
            bin,
            self.num_offset_bits + self.num_index_bits,
            u32::BITS,
        );
        AddrFields {
            tag,
            index: SetIndex::new(index, self.num_index_bits),
            offset,
        }
    }
    pub fn binary(&self, addr: WordAddr) -> BinaryAddr {
        BinaryAddr::new(addr, self.num_addr_bits)
    }
}
