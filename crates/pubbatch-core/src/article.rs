//! Article record shared by retrieval and batching

/// Separator placed between title and abstract when counting words and tokens.
pub const TEXT_SEPARATOR: &str = " ";

/// One retrieved article: identifier, title, optional abstract.
///
/// Token and word counts start out empty and are filled exactly once by
/// [`ArticleRecord::ensure_counts`]; later calls return the cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pmid: String,
    title: String,
    abstract_text: Option<String>,
    pub_year: Option<i32>,
    token_count: Option<usize>,
    word_count: Option<usize>,
}

impl ArticleRecord {
    pub fn new(
        pmid: impl Into<String>,
        title: impl Into<String>,
        abstract_text: Option<String>,
        pub_year: Option<i32>,
    ) -> Self {
        Self {
            pmid: pmid.into(),
            title: title.into(),
            abstract_text,
            pub_year,
            token_count: None,
            word_count: None,
        }
    }

    pub fn pmid(&self) -> &str {
        &self.pmid
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn abstract_text(&self) -> Option<&str> {
        self.abstract_text.as_deref()
    }

    pub fn pub_year(&self) -> Option<i32> {
        self.pub_year
    }

    pub fn has_abstract(&self) -> bool {
        self.abstract_text.is_some()
    }

    /// Title and abstract joined by [`TEXT_SEPARATOR`]
    pub fn combined_text(&self) -> String {
        let abstract_text = self.abstract_text.as_deref().unwrap_or("");
        format!("{}{TEXT_SEPARATOR}{abstract_text}", self.title)
    }

    /// Compute token and word counts once, returning the token count.
    pub fn ensure_counts(&mut self, count_tokens: impl FnOnce(&str) -> usize) -> usize {
        if let Some(tokens) = self.token_count {
            return tokens;
        }
        let text = self.combined_text();
        let tokens = count_tokens(&text);
        self.word_count = Some(text.split_whitespace().count());
        self.token_count = Some(tokens);
        tokens
    }

    /// Cached token count, `None` until [`ensure_counts`](Self::ensure_counts) ran
    pub fn token_count(&self) -> Option<usize> {
        self.token_count
    }

    /// Cached whitespace word count of title + abstract
    pub fn word_count(&self) -> Option<usize> {
        self.word_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sample() -> ArticleRecord {
        ArticleRecord::new(
            "12345",
            "Gut microbiome",
            Some("We studied the gut.".to_string()),
            Some(2021),
        )
    }

    #[test]
    fn combined_text_uses_separator() {
        assert_eq!(sample().combined_text(), "Gut microbiome We studied the gut.");
    }

    #[test]
    fn combined_text_without_abstract() {
        let a = ArticleRecord::new("1", "Only title", None, None);
        assert!(!a.has_abstract());
        assert_eq!(a.combined_text(), "Only title ");
    }

    #[test]
    fn counts_start_empty() {
        let a = sample();
        assert_eq!(a.token_count(), None);
        assert_eq!(a.word_count(), None);
    }

    #[test]
    fn ensure_counts_computes_once() {
        let calls = Cell::new(0);
        let mut a = sample();
        let counter = |t: &str| {
            calls.set(calls.get() + 1);
            t.len()
        };
        let first = a.ensure_counts(counter);
        let second = a.ensure_counts(|_| 999);
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        assert_eq!(a.token_count(), Some(first));
        assert_eq!(a.word_count(), Some(6));
    }

    #[test]
    fn accessors() {
        let a = sample();
        assert_eq!(a.pmid(), "12345");
        assert_eq!(a.title(), "Gut microbiome");
        assert_eq!(a.abstract_text(), Some("We studied the gut."));
        assert_eq!(a.pub_year(), Some(2021));
    }
}
