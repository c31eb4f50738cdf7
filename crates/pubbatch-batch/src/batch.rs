//! Sealed groups of articles

use pubbatch_core::ArticleRecord;

/// Ordered articles plus their cumulative token count.
///
/// Built only by the assembler; immutable once handed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    index: usize,
    articles: Vec<ArticleRecord>,
    tokens: usize,
}

impl Batch {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            articles: Vec::new(),
            tokens: 0,
        }
    }

    pub(crate) fn push(&mut self, article: ArticleRecord, tokens: usize) {
        self.tokens += tokens;
        self.articles.push(article);
    }

    /// 0-based position in creation order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn articles(&self) -> &[ArticleRecord] {
        &self.articles
    }

    pub fn into_articles(self) -> Vec<ArticleRecord> {
        self.articles
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn words(&self) -> usize {
        self.articles.iter().filter_map(|a| a.word_count()).sum()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// A lone article over `token_limit`.
    pub fn is_oversized(&self, token_limit: usize) -> bool {
        self.articles.len() == 1 && self.tokens > token_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(pmid: &str, tokens: usize) -> ArticleRecord {
        let mut a = ArticleRecord::new(pmid, "a title", Some("an abstract".into()), None);
        a.ensure_counts(|_| tokens);
        a
    }

    #[test]
    fn push_accumulates() {
        let mut b = Batch::new(3);
        assert!(b.is_empty());
        b.push(counted("1", 10), 10);
        b.push(counted("2", 5), 5);
        assert_eq!(b.index(), 3);
        assert_eq!(b.len(), 2);
        assert_eq!(b.tokens(), 15);
        assert_eq!(b.words(), 8);
    }

    #[test]
    fn oversized_only_for_singletons() {
        let mut b = Batch::new(0);
        b.push(counted("1", 150), 150);
        assert!(b.is_oversized(100));
        assert!(!b.is_oversized(150));
        b.push(counted("2", 1), 1);
        assert!(!b.is_oversized(100));
    }
}
