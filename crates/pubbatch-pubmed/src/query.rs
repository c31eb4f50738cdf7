//! ESearch term construction from a user query and filters

use chrono::Datelike;

/// Inclusive publication-year range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start_year: i32,
    pub end_year: i32,
}

impl DateRange {
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year: start_year.min(end_year),
            end_year: start_year.max(end_year),
        }
    }

    /// The last `years` years up to and including `current_year`.
    pub fn last_years_from(years: u32, current_year: i32) -> Self {
        let span = i32::try_from(years).unwrap_or(i32::MAX);
        Self::new(current_year.saturating_sub(span), current_year)
    }

    /// The last `years` years up to today (local time).
    pub fn last_years(years: u32) -> Self {
        Self::last_years_from(years, chrono::Local::now().year())
    }

    fn to_term(self) -> String {
        format!(
            "(\"{}/01/01\"[Date - Publication] : \"{}/12/31\"[Date - Publication])",
            self.start_year, self.end_year
        )
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year)
    }
}

/// User query plus the filters applied upstream of retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free text, MeSH terms or any PubMed syntax
    pub term: String,
    pub date_range: Option<DateRange>,
    pub reviews_only: bool,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            date_range: None,
            reviews_only: false,
        }
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn reviews_only(mut self, yes: bool) -> Self {
        self.reviews_only = yes;
        self
    }

    /// Render the ESearch `term` parameter.
    pub fn to_term(&self) -> String {
        let mut term = format!("({})", self.term.trim());
        if self.reviews_only {
            term.push_str(" AND \"review\"[Publication Type]");
        }
        if let Some(range) = self.date_range {
            term.push_str(" AND ");
            term.push_str(&range.to_term());
        }
        term
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_term_parenthesized() {
        assert_eq!(SearchQuery::new(" crispr ").to_term(), "(crispr)");
    }

    #[test]
    fn reviews_filter_appended() {
        let q = SearchQuery::new("\"Deep Learning\"[MeSH]").reviews_only(true);
        assert_eq!(
            q.to_term(),
            "(\"Deep Learning\"[MeSH]) AND \"review\"[Publication Type]"
        );
    }

    #[test]
    fn date_range_appended() {
        let q = SearchQuery::new("sepsis").with_date_range(DateRange::new(2019, 2024));
        assert_eq!(
            q.to_term(),
            "(sepsis) AND (\"2019/01/01\"[Date - Publication] : \"2024/12/31\"[Date - Publication])"
        );
    }

    #[test]
    fn reviews_and_dates_combined() {
        let q = SearchQuery::new("a OR b")
            .reviews_only(true)
            .with_date_range(DateRange::new(2020, 2020));
        let term = q.to_term();
        assert!(term.starts_with("(a OR b) AND \"review\""));
        assert!(term.ends_with("\"2020/12/31\"[Date - Publication])"));
    }

    #[test]
    fn last_years_from_current() {
        assert_eq!(DateRange::last_years_from(5, 2026), DateRange::new(2021, 2026));
        assert_eq!(DateRange::last_years_from(0, 2026), DateRange::new(2026, 2026));
    }

    #[test]
    fn reversed_range_normalized() {
        let r = DateRange::new(2024, 2019);
        assert_eq!((r.start_year, r.end_year), (2019, 2024));
        assert_eq!(r.to_string(), "2019-2024");
    }
}
