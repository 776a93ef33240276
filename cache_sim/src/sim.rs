use crate::{
    addr::WordAddr,
    cache::{Cache, CacheLevel, ReplacementPolicy},
    geometry::{self, CacheGeometry, GeometryError},
    reference::{CacheStatus, Reference},
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

/// word addresses showing temporal locality, followed by a detour.
pub const DEMO_WORKLOAD: [u32; 15] = [1, 2, 3, 4, 1, 2, 3, 4, 10, 11, 12, 1, 2, 3, 4];

#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    pub geometry: CacheGeometry,
    pub policy: ReplacementPolicy,
    /// associativity of the L2 cache. L2 is simulated only if this is given;
    /// it shares the set count and block size of L1.
    pub l2_num_blocks_per_set: Option<usize>,
}

impl SimConfig {
    pub fn demo() -> Self {
        Self {
            geometry: CacheGeometry {
                cache_size: 8,
                num_blocks_per_set: 2,
                num_words_per_block: 2,
                num_addr_bits: 8,
            },
            policy: ReplacementPolicy::Lru,
            l2_num_blocks_per_set: None,
        }
    }
}

pub struct Simulator {
    geometry: CacheGeometry,
    policy: ReplacementPolicy,
    l1: Cache,
    l2: Option<Cache>,
}

pub struct SimOutput {
    pub geometry: CacheGeometry,
    pub refs: Vec<Reference>,
    pub l1: Cache,
    pub l2: Option<Cache>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> geometry::Result<Self> {
        let SimConfig {
            geometry,
            policy,
            l2_num_blocks_per_set,
        } = config;
        geometry.validate()?;
        let num_sets = geometry.num_sets();
        let num_index_bits = geometry.num_index_bits();
        let l1 = Cache::new(
            num_sets,
            num_index_bits,
            geometry.num_blocks_per_set,
            CacheLevel::Upper,
        );
        let l2 = match l2_num_blocks_per_set {
            Some(0) => {
                return Err(GeometryError::Zero {
                    name: "number of L2 blocks per set",
                })
            }
            Some(n) => Some(Cache::new(num_sets, num_index_bits, n, CacheLevel::Lower)),
            None => None,
        };
        log::info!(
            "{} set(s) of {} block(s), {} word(s) per block, {} replacement{}",
            num_sets,
            geometry.num_blocks_per_set,
            geometry.num_words_per_block,
            policy,
            match l2_num_blocks_per_set {
                Some(n) => format!(", L2 with {n} block(s) per set"),
                None => String::new(),
            }
        );
        Ok(Self {
            geometry,
            policy,
            l1,
            l2,
        })
    }
    pub fn run(self, word_addrs: &[u32]) -> SimOutput {
        let Self {
            mut geometry,
            policy,
            mut l1,
            mut l2,
        } = self;
        let max = word_addrs.iter().copied().max().unwrap_or_default();
        geometry.fit_addr_bits(WordAddr::new(max));
        let codec = geometry.codec();
        log::info!(
            "address split: {} tag, {} index, {} offset bit(s)",
            codec.num_tag_bits(),
            codec.num_index_bits(),
            codec.num_offset_bits()
        );
        let mut refs: Vec<_> = word_addrs
            .iter()
            .map(|&a| Reference::new(WordAddr::new(a), &codec))
            .collect();
        l1.read_refs(geometry.num_words_per_block, policy, &mut refs, l2.as_mut());
        let output = SimOutput {
            geometry,
            refs,
            l1,
            l2,
        };
        log::info!(
            "finished {} reference(s): {} hit(s), {} miss(es)",
            output.refs.len(),
            output.hit_count(),
            output.miss_count()
        );
        output
    }
}

impl SimOutput {
    fn count(&self, status: CacheStatus) -> usize {
        self.refs
            .iter()
            .filter(|r| r.cache_status == Some(status))
            .count()
    }
    pub fn hit_count(&self) -> usize {
        self.count(CacheStatus::Hit)
    }
    pub fn miss_count(&self) -> usize {
        self.count(CacheStatus::Miss)
    }
    #[cfg(feature = "stat")]
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

#[cfg(feature = "stat")]
impl AddStats for SimOutput {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(stat::RefTable::new(&self.refs)));
        buf.push(Box::new(stat::CacheContents::new("L1 cache", &self.l1)));
        if let Some(l2) = &self.l2 {
            buf.push(Box::new(stat::CacheContents::new("L2 cache", l2)));
        }
        buf.push(Box::new(stat::HitMissStat::new(
            self.hit_count(),
            self.miss_count(),
        )));
    }
}

#[cfg(feature = "stat")]
mod stat {
    use std::fmt;

    use crate::{
        cache::{Cache, SetIndex},
        reference::Reference,
        stat::*,
    };

    struct Row {
        word_addr: String,
        bin_addr: String,
        tag: String,
        index: String,
        offset: String,
        status: String,
    }

    const HEADINGS: [&str; 6] = ["WordAddr", "BinAddr", "Tag", "Index", "Offset", "Hit/Miss"];

    pub struct RefTable {
        rows: Vec<Row>,
        /// width of each column
        widths: [usize; 6],
    }

    impl RefTable {
        pub fn new(refs: &[Reference]) -> Self {
            let rows: Vec<_> = refs
                .iter()
                .map(|r| Row {
                    word_addr: r.word_addr.to_string(),
                    bin_addr: r.bin_addr.to_string(),
                    tag: r.tag.to_string(),
                    index: r.index.to_string(),
                    offset: r.offset.to_string(),
                    status: r
                        .cache_status
                        .map_or_else(|| "?".to_owned(), |s| s.to_string()),
                })
                .collect();
            let mut widths = HEADINGS.map(str::len);
            for row in &rows {
                for (w, cell) in widths.iter_mut().zip(row.cells()) {
                    *w = (*w).max(cell.len());
                }
            }
            Self { rows, widths }
        }
    }

    impl Row {
        fn cells(&self) -> [&str; 6] {
            [
                &self.word_addr,
                &self.bin_addr,
                &self.tag,
                &self.index,
                &self.offset,
                &self.status,
            ]
        }
    }

    impl Stat for RefTable {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ RefTable {
        fn header(&self) -> &'static str {
            "references"
        }
        fn width(&self) -> usize {
            self.widths.iter().sum::<usize>() + 2 * self.widths.len()
        }
    }

    impl fmt::Display for &'_ RefTable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write_row(f, HEADINGS, self.widths)?;
            for row in &self.rows {
                write_row(f, row.cells(), self.widths)?;
            }
            Ok(())
        }
    }

    fn write_row(f: &mut fmt::Formatter<'_>, cells: [&str; 6], widths: [usize; 6]) -> fmt::Result {
        write!(f, " ")?;
        for (cell, width) in cells.into_iter().zip(widths) {
            write!(f, " {cell:>width$} ")?;
        }
        writeln!(f)
    }

    pub struct CacheContents {
        header: &'static str,
        /// `index: [words] [words]` for each set
        sets: Vec<String>,
        cell_width: usize,
    }

    impl CacheContents {
        pub fn new(header: &'static str, cache: &Cache) -> Self {
            let sets: Vec<_> = cache
                .sets()
                .map(|(index, blocks)| {
                    let blocks: Vec<_> = blocks
                        .iter()
                        .map(|b| {
                            let words: Vec<_> = b.words.iter().map(|w| w.to_string()).collect();
                            format!("[{}]", words.join(" "))
                        })
                        .collect();
                    match index {
                        SetIndex::Unindexed => blocks.join(" "),
                        SetIndex::Indexed(_) => format!("{index}: {}", blocks.join(" ")),
                    }
                })
                .collect();
            let cell_width = sets.iter().map(String::len).max().unwrap_or(0);
            Self {
                header,
                sets,
                cell_width,
            }
        }
    }

    impl Stat for CacheContents {
        fn view(&self, max_width: usize) -> Box<dyn StatView + '_> {
            Box::new(CacheContentsView::new(self, max_width))
        }
    }

    pub struct CacheContentsView<'a> {
        stat: &'a CacheContents,
        chunk_size: usize,
    }

    impl<'a> CacheContentsView<'a> {
        pub fn new(stat: &'a CacheContents, max_width: usize) -> Self {
            let chunk_size = stat.chunk_size(max_width).clamp(1, stat.sets.len().max(1));
            Self { stat, chunk_size }
        }
    }

    impl Width for CacheContents {
        fn width_by_chunk_size(&self, chunk_size: usize) -> usize {
            chunk_size * self.cell_width + (chunk_size - 1) * 3 + 2
        }
    }

    impl StatView for CacheContentsView<'_> {
        fn header(&self) -> &'static str {
            self.stat.header
        }
        fn width(&self) -> usize {
            self.stat.width_by_chunk_size(self.chunk_size)
        }
    }

    impl fmt::Display for CacheContentsView<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let width = self.stat.cell_width;
            for chunk in self.stat.sets.chunks(self.chunk_size) {
                let cells: Vec<_> = chunk.iter().map(|s| format!("{s:<width$}")).collect();
                writeln!(f, "  {}", cells.join(" | ").trim_end())?;
            }
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    pub struct HitMissStat {
        hit_count: usize,
        miss_count: usize,
    }

    impl HitMissStat {
        pub fn new(hit_count: usize, miss_count: usize) -> Self {
            Self {
                hit_count,
                miss_count,
            }
        }
    }

    impl Stat for HitMissStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ HitMissStat {
        fn header(&self) -> &'static str {
            "hit / miss"
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for &'_ HitMissStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let hit = self.hit_count;
            let miss = self.miss_count;
            let total = (hit + miss).max(1);
            let hit_pct = format!("{:.6}", 100. * hit as f64 / total as f64);
            let miss_pct = format!("{:.6}", 100. * miss as f64 / total as f64);
            writeln!(f, "      hit: {hit:>10} ({hit_pct:>10}%)")?;
            writeln!(f, "     miss: {miss:>10} ({miss_pct:>10}%)")
        }
    }
}
