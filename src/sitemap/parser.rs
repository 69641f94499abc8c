use crate::sitemap::SitemapError;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::io::Cursor;

/// Contents of one sitemap file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapDocument {
    /// Page URLs from `<url><loc>` entries
    pub urls: Vec<String>,

    /// Child sitemaps from `<sitemap><loc>` entries (sitemap index)
    pub child_sitemaps: Vec<String>,
}

impl SitemapDocument {
    pub fn is_index(&self) -> bool {
        !self.child_sitemaps.is_empty()
    }
}

/// Parses sitemap XML (`urlset` or `sitemapindex`)
///
/// Entries with a missing or unparseable `<loc>` are skipped. Any XML error
/// rejects the whole document.
pub fn parse_sitemap(xml_data: &[u8]) -> Result<SitemapDocument, SitemapError> {
    let mut document = SitemapDocument::default();
    let parser = SiteMapReader::new(Cursor::new(xml_data));

    for entity in parser {
        match entity {
            SiteMapEntity::Url(url_entry) => {
                if let Some(url) = url_entry.loc.get_url() {
                    document.urls.push(url.to_string());
                }
            }
            SiteMapEntity::SiteMap(sitemap_entry) => {
                if let Some(url) = sitemap_entry.loc.get_url() {
                    document.child_sitemaps.push(url.to_string());
                }
            }
            SiteMapEntity::Err(error) => {
                return Err(SitemapError::Parse(error.to_string()));
            }
        }
    }

    Ok(document)
}
