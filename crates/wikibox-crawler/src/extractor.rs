use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Node, Selector};

use crate::config::Markers;
use crate::record::{Extraction, InfoboxRecord, NAME_FIELD};

/// Value used for a row missing its header or data cell.
pub const MISSING_CELL: &str = "None";

lazy_static! {
    static ref ROW: Selector = Selector::parse("tr").unwrap();
    static ref HEADER_CELL: Selector = Selector::parse("th").unwrap();
    static ref DATA_CELL: Selector = Selector::parse("td").unwrap();
    static ref LIST_ITEM: Selector = Selector::parse("li").unwrap();
    static ref LIST_ITEM_LINK: Selector = Selector::parse("li a").unwrap();
}

/// Turns a downloaded page into an infobox record and related keywords.
pub trait Extract {
    /// `content` is `None` when the page couldn't be downloaded.
    fn extract(&self, keyword: &str, content: Option<&str>) -> Extraction;
}

impl<T> Extract for T
where
    T: Fn(&str, Option<&str>) -> Extraction,
{
    fn extract(&self, keyword: &str, content: Option<&str>) -> Extraction {
        self(keyword, content)
    }
}

/// Extractor locating blocks with CSS selectors.
#[derive(Debug, Clone)]
pub struct InfoboxExtractor {
    infobox: Selector,
    related_links: Selector,
    item_list: Selector,
    excluded_title_prefix: String,
}

impl InfoboxExtractor {
    pub fn new(markers: &Markers) -> Result<Self> {
        Ok(Self {
            infobox: parse_selector(&markers.infobox)?,
            related_links: parse_selector(&markers.related_links)?,
            item_list: parse_selector(&markers.item_list)?,
            excluded_title_prefix: markers.excluded_title_prefix.clone(),
        })
    }

    /// Reads every row of the first infobox, an empty record if there is none.
    pub fn extract_record(&self, keyword: &str, html: &Html) -> InfoboxRecord {
        let table = match html.select(&self.infobox).next() {
            Some(table) => table,
            None => return InfoboxRecord::default(),
        };

        let mut record = InfoboxRecord::default();
        for row in table.select(&ROW) {
            let field = row
                .select(&HEADER_CELL)
                .next()
                .map(|th| cell_text(th).replace('\n', "\t"))
                .unwrap_or_else(|| MISSING_CELL.to_string());

            let value = match row.select(&DATA_CELL).next() {
                Some(td) => match row.select(&self.item_list).next() {
                    Some(list) => list
                        .select(&LIST_ITEM)
                        .map(|li| li.text().collect::<String>())
                        .collect::<Vec<_>>()
                        .join("\t"),
                    None => cell_text(td).replace('\n', "\t"),
                },
                None => MISSING_CELL.to_string(),
            };

            record.insert(field, value);
        }
        record.insert(NAME_FIELD, keyword);

        record
    }

    /// Titles of the links found in the related links blocks, index pages excluded.
    pub fn extract_related(&self, html: &Html) -> Vec<String> {
        html.select(&self.related_links)
            .flat_map(|block| block.select(&LIST_ITEM_LINK))
            .filter_map(|a| a.value().attr("title"))
            .filter(|title| !title.is_empty() && !title.starts_with(&self.excluded_title_prefix))
            .map(String::from)
            .collect()
    }
}

impl Extract for InfoboxExtractor {
    fn extract(&self, keyword: &str, content: Option<&str>) -> Extraction {
        let content = match content {
            Some(content) => content,
            None => {
                log::error!("Keyword = '{keyword}' has no content");
                return Extraction::default();
            }
        };

        let html = Html::parse_document(content);
        let related = self.extract_related(&html);
        let record = self.extract_record(keyword, &html);
        if record.is_empty() {
            log::error!("Keyword = '{keyword}' has no infobox");
        }

        Extraction { record, related }
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {css:?} got: {e}"))
}

/// Text of a cell where `<br>` elements count as line breaks.
fn cell_text(cell: ElementRef) -> String {
    let mut text = String::new();
    for node in cell.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => (),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> InfoboxExtractor {
        InfoboxExtractor::new(&Markers::default()).unwrap()
    }

    fn page(body: &str) -> String {
        format!("<!DOCTYPE html><html><head><title>t</title></head><body>{body}</body></html>")
    }

    #[test]
    fn name_is_the_keyword() {
        let html = page(
            r#"<table class="infobox vcard">
                 <tr><th>Name</th><td>Something else</td></tr>
                 <tr><th>Formed</th><td>1947</td></tr>
               </table>"#,
        );
        let ex = extractor().extract("Department of Defense", Some(&html));
        assert_eq!(ex.record.name(), Some("Department of Defense"));
        assert_eq!(ex.record.get("Formed"), Some("1947"));
    }

    #[test]
    fn line_breaks_become_tabs() {
        let html = page(
            "<table class=\"infobox\">\
               <tr><th>Preceding\nOffice</th><td>War Department</td></tr>\
               <tr><th>Headquarters</th><td>The Pentagon<br>Arlington County</td></tr>\
             </table>",
        );
        let record = extractor().extract("DoD", Some(&html)).record;
        assert_eq!(record.get("Preceding\tOffice"), Some("War Department"));
        assert_eq!(record.get("Headquarters"), Some("The Pentagon\tArlington County"));
    }

    #[test]
    fn item_list_overrides_cell_text() {
        let html = page(
            r#"<table class="infobox">
                 <tr><th>Child agencies</th><td>Ignored
                   <div class="plainlist"><ul><li>A</li><li>B</li></ul></div>
                 </td></tr>
               </table>"#,
        );
        let record = extractor().extract("DoD", Some(&html)).record;
        assert_eq!(record.get("Child agencies"), Some("A\tB"));
    }

    #[test]
    fn missing_cells_use_sentinel() {
        let html = page(
            r#"<table class="infobox">
                 <tr><td>No header</td></tr>
                 <tr><th>No data</th></tr>
               </table>"#,
        );
        let record = extractor().extract("DoD", Some(&html)).record;
        assert_eq!(record.get(MISSING_CELL), Some("No header"));
        assert_eq!(record.get("No data"), Some(MISSING_CELL));
    }

    #[test]
    fn last_row_wins() {
        let html = page(
            r#"<table class="infobox">
                 <tr><th>Motto</th><td>First</td></tr>
                 <tr><th>Motto</th><td>Second</td></tr>
               </table>"#,
        );
        let record = extractor().extract("DoD", Some(&html)).record;
        assert_eq!(record.get("Motto"), Some("Second"));
    }

    #[test]
    fn missing_infobox_keeps_related_keywords() {
        let html = page(
            r#"<p>No infobox here</p>
               <table class="nowraplinks navbox-subgroup">
                 <tr><td><ul><li><a title="United States Army">Army</a></li></ul></td></tr>
               </table>"#,
        );
        let ex = extractor().extract("Nothing", Some(&html));
        assert!(ex.record.is_empty());
        assert_eq!(ex.related, vec!["United States Army"]);
    }

    #[test]
    fn no_content_is_a_failure() {
        assert_eq!(extractor().extract("Nothing", None), Extraction::default());
    }

    #[test]
    fn related_titles_are_filtered() {
        let html = page(
            r#"<table class="nowraplinks navbox-subgroup"><tr><td><ul>
                 <li><a title="List of Secretaries of Defense">Secretaries</a></li>
                 <li><a title="United States Army">Army</a></li>
                 <li><a href="/wiki/Navy">Navy</a></li>
                 <li><a title="">Empty</a></li>
               </ul></td></tr></table>
               <table class="nowraplinks"><tr><td><ul>
                 <li><a title="Not a subgroup">Other</a></li>
               </ul></td></tr></table>"#,
        );
        let html = Html::parse_document(&html);
        assert_eq!(extractor().extract_related(&html), vec!["United States Army"]);
    }

    #[test]
    fn invalid_marker_is_rejected() {
        let markers = Markers {
            infobox: "table..infobox".into(),
            ..Default::default()
        };
        assert!(InfoboxExtractor::new(&markers).is_err());
    }
}
