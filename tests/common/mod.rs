#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use cazy_harvest::cazy::config::{CrawlConfig, Settings};
use cazy_harvest::cazy::fetcher::{FetchError, Transport};

pub const HOME: &str = "http://www.cazy.org";

/// Serves pages from memory. A URL can be scripted to fail a number of
/// times before it is served, or forever.
#[derive(Default)]
pub struct MemoryTransport {
    pages: HashMap<String, String>,
    failures: Mutex<HashMap<String, usize>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    pub fn failing(self, url: &str, times: usize) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), times);
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Transport for MemoryTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    message: "connection reset by peer".to_string(),
                });
            }
        }

        self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

impl Transport for &MemoryTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        (**self).get(url)
    }
}

pub fn home_page() -> String {
    r#"<html><body>
        <a class="spip_out" href="Glycoside-Hydrolases.html">Glycoside Hydrolases (GHs)</a>
        <a class="spip_out" href="Polysaccharide-Lyases.html">Polysaccharide Lyases (PLs)</a>
        <a class="spip_out" href="Genomes.html">Genomes</a>
    </body></html>"#
        .to_string()
}

pub fn class_page(families: &[&str]) -> String {
    let links: String = families
        .iter()
        .map(|f| format!(r#"<td><a href="{}.html">{}</a></td>"#, f, f))
        .collect();
    format!(
        r#"<html><body><div>
            <h3>Tables for Direct Access</h3>
            <table><tr>{}</tr></table>
        </div></body></html>"#,
        links
    )
}

pub struct Row<'a> {
    pub name: &'a str,
    pub ec: &'a str,
    pub organism: &'a str,
    pub genbank: &'a str,
}

/// An empty kingdom leaves the section without a heading row.
pub fn listing_page(sections: Vec<(&str, Vec<Row>)>, last_offset: Option<usize>) -> String {
    let mut rows = String::new();
    for (kingdom, entries) in sections {
        if !kingdom.is_empty() {
            rows.push_str(&format!(r#"<tr class="royaume"><td colspan="6">{}</td></tr>"#, kingdom));
        }
        for row in entries {
            let ec = if row.ec.is_empty() {
                String::new()
            } else {
                format!(r#"<a href="http://www.enzyme-database.org">{}</a>"#, row.ec)
            };
            rows.push_str(&format!(
                r#"<tr><td>{}</td><td>{}</td><td>{}</td><td><a href="https://www.ncbi.nlm.nih.gov">{}</a></td><td></td><td></td></tr>"#,
                row.name, ec, row.organism, row.genbank
            ));
        }
    }

    let pagination = last_offset
        .map(|n| format!(r#"<a class="lastpage" href="GH1_all.html?debut_PRINC={}#pagination_PRINC">Last</a>"#, n))
        .unwrap_or_default();

    format!(
        r#"<html><body><table class="listing">
            <tr class="ligne_titre"><td>Protein Name</td><td>EC#</td><td>Organism</td><td>GenBank</td><td>Uniprot</td><td>PDB/3D</td></tr>
            {}
        </table>{}</body></html>"#,
        rows, pagination
    )
}

pub fn config(families: &[&str], retries: u32) -> CrawlConfig {
    let mut settings = Settings {
        database_url: Some(":memory:".to_string()),
        ..Default::default()
    };
    settings.crawl.retries = retries;
    settings.scope.families = families.iter().map(|f| f.to_string()).collect();
    CrawlConfig::from_settings(settings).unwrap()
}
