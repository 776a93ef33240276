use std::fmt;

/// Views laid out in columns, as many as fit in a given width.
pub trait Width {
    fn width_by_chunk_size(&self, chunk_size: usize) -> usize;
    fn chunk_size(&self, max_width: usize) -> usize {
        let mut chunk_size = 2;
        loop {
            if self.width_by_chunk_size(chunk_size) > max_width {
                break chunk_size - 1;
            }
            chunk_size += 1;
        }
    }
}

pub trait Stat {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    /// header of stat
    fn header(&self) -> &'static str;
    /// body width
    fn width(&self) -> usize;
}

pub trait AddStats {
    /// add stat to `buf`.
    fn add_stats(&self, buf: &mut Stats);
}

#[derive(Default)]
pub struct Stats {
    stats: Vec<Box<dyn Stat>>,
}

impl Stats {
    pub fn push(&mut self, stat: Box<dyn Stat>) {
        self.stats.push(stat)
    }
    pub fn view(&self, max_width: usize) -> StatAllView<'_> {
        StatAllView {
            views: self.stats.iter().map(|s| s.view(max_width)).collect(),
        }
    }
}

pub struct StatAllView<'s> {
    views: Vec<Box<dyn StatView + 's>>,
}

impl fmt::Display for StatAllView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .views
            .iter()
            .map(|s| s.header().len().max(s.width()))
            .max()
            .unwrap_or(0);
        writeln!(f, "{:-^width$}", " cache simulation ")?;
        for sv in &self.views {
            writeln!(f, "{}:", sv.header())?;
            writeln!(f, "{}", sv)?;
        }
        write!(f, "{:-<width$}", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl Stat for Fixed {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ Fixed {
        fn header(&self) -> &'static str {
            "fixed"
        }
        fn width(&self) -> usize {
            self.0.len()
        }
    }

    impl fmt::Display for &'_ Fixed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    struct Columns(usize);

    impl Width for Columns {
        fn width_by_chunk_size(&self, chunk_size: usize) -> usize {
            chunk_size * self.0
        }
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(Columns(10).chunk_size(35), 3);
        assert_eq!(Columns(10).chunk_size(5), 1);
    }
    #[test]
    fn test_all_view_frame() {
        let mut ss = Stats::default();
        ss.push(Box::new(Fixed("twenty characters..")));
        let text = ss.view(80).to_string();
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].contains(" cache simulation "));
        assert_eq!(lines[1..3], ["fixed:", "twenty characters.."]);
        assert_eq!(lines.last(), Some(&"-".repeat(19).as_str()));
    }
}
