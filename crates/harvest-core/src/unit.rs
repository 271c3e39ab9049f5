//! Child unit references shared by the tracker and the termination sampler.

use serde::{Deserialize, Serialize};

/// One season of a competition, as discovered by the extraction layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonRef {
    pub season_id: String,
    /// Season label; usually a four-digit year.
    pub year: String,
}

impl SeasonRef {
    pub fn new(season_id: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            season_id: season_id.into(),
            year: year.into(),
        }
    }

    /// Numeric year, when the label is a plain integer.
    pub fn year_number(&self) -> Option<i32> {
        self.year.trim().parse().ok()
    }
}

/// Order seasons newest first; non-numeric labels last.
pub fn sort_newest_first(seasons: &mut [SeasonRef]) {
    seasons.sort_by(|a, b| {
        b.year_number()
            .cmp(&a.year_number())
            .then_with(|| a.season_id.cmp(&b.season_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_number_parses_plain_years_only() {
        assert_eq!(SeasonRef::new("2019", "2019").year_number(), Some(2019));
        assert_eq!(SeasonRef::new("x", " 2003 ").year_number(), Some(2003));
        assert_eq!(SeasonRef::new("x", "2019/20").year_number(), None);
    }

    #[test]
    fn newest_first_with_labels_last() {
        let mut s = vec![
            SeasonRef::new("a", "2019"),
            SeasonRef::new("b", "n/a"),
            SeasonRef::new("c", "2023"),
            SeasonRef::new("d", "2021"),
        ];
        sort_newest_first(&mut s);
        let ids: Vec<_> = s.iter().map(|x| x.season_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "a", "b"]);
    }
}
