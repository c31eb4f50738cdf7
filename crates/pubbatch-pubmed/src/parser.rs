//! PubMed EFetch XML parser using quick-xml
//!
//! Streaming parser for the `PubmedArticleSet` documents EFetch returns,
//! keeping only what batching needs: PMID, title, abstract, year.

use anyhow::{Context, Result};
use pubbatch_core::ArticleRecord;
use quick_xml::Reader;
use quick_xml::events::Event;

/// Article fields extracted from one `<PubmedArticle>`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedArticle {
    pub pmid: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub pub_year: Option<i32>,
}

impl ParsedArticle {
    /// Convert into the pipeline's record. Blank abstracts count as absent.
    pub fn into_record(self) -> ArticleRecord {
        let abstract_text = self.abstract_text.filter(|a| !a.trim().is_empty());
        ArticleRecord::new(
            self.pmid,
            self.title.unwrap_or_default(),
            abstract_text,
            self.pub_year,
        )
    }
}

/// Parse every `<PubmedArticle>` in an EFetch response.
///
/// Articles without a PMID are dropped (they cannot be matched to a request).
pub fn parse_efetch_xml(xml: &str) -> Result<Vec<ParsedArticle>> {
    // Untrimmed: whitespace around inline markup belongs to the text
    let mut reader = Reader::from_str(xml);

    let mut articles = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"PubmedArticle" => {
                let article = parse_article(&mut reader).context("malformed PubmedArticle")?;
                if article.pmid.is_empty() {
                    log::debug!("PubmedArticle without PMID ignored");
                } else {
                    articles.push(article);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e).context("XML parse error"),
            _ => {}
        }
        buf.clear();
    }

    Ok(articles)
}

fn parse_article(reader: &mut Reader<&[u8]>) -> Result<ParsedArticle> {
    let mut article = ParsedArticle::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"MedlineCitation" => parse_medline_citation(reader, &mut article)?,
                b"PubmedData" => skip_element(reader, b"PubmedData")?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubmedArticle" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(article)
}

fn parse_medline_citation(reader: &mut Reader<&[u8]>, article: &mut ParsedArticle) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                // First PMID is the citation's own; later ones live in CommentsCorrections
                b"PMID" if article.pmid.is_empty() => {
                    article.pmid = read_text(reader)?.trim().to_string()
                }
                b"Article" => parse_article_element(reader, article)?,
                b"CommentsCorrectionsList" => skip_element(reader, b"CommentsCorrectionsList")?,
                b"OtherAbstract" => skip_element(reader, b"OtherAbstract")?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"MedlineCitation" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn parse_article_element(reader: &mut Reader<&[u8]>, article: &mut ParsedArticle) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"PubDate" => article.pub_year = parse_pub_date(reader)?,
                b"ArticleTitle" => {
                    article.title = Some(read_text_content(reader, b"ArticleTitle")?)
                }
                b"Abstract" => article.abstract_text = parse_abstract(reader)?,
                b"AuthorList" => skip_element(reader, b"AuthorList")?,
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Article" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// `<PubDate>`: `<Year>` when present, else the leading year of `<MedlineDate>`
fn parse_pub_date(reader: &mut Reader<&[u8]>) -> Result<Option<i32>> {
    let mut buf = Vec::new();
    let mut year = None;
    let mut medline_year = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Year" => year = read_text(reader)?.trim().parse().ok(),
                b"MedlineDate" => medline_year = leading_year(&read_text(reader)?),
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"PubDate" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(year.or(medline_year))
}

/// "1998 Dec-1999 Jan" -> 1998
fn leading_year(s: &str) -> Option<i32> {
    let s = s.trim();
    let digits = s.get(..4)?;
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Join all `<AbstractText>` sections with a space. `None` when there are none.
fn parse_abstract(reader: &mut Reader<&[u8]>) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let mut text_parts = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"AbstractText" => {
                text_parts.push(read_text_content(reader, b"AbstractText")?);
            }
            Event::End(e) if e.name().as_ref() == b"Abstract" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if text_parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text_parts.join(" ")))
    }
}

fn skip_element(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

/// Read text content until next end tag
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::End(_) => break,
            Event::Start(_) => {
                // Handle nested elements (like <i>, <b>, etc.)
                text.push_str(&read_text(reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Read text content of a specific element, flattening nested markup
/// (`CO<sub>2</sub>` reads "CO2"). Only the outer ends are trimmed.
fn read_text_content(reader: &mut Reader<&[u8]>, end_tag: &[u8]) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth -= 1;
                if depth == 0 && e.name().as_ref() == end_tag {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text.trim().to_string())
}
