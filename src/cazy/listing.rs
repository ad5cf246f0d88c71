//! Family listing pages: pagination discovery and protein row parsing.
//!
//! A listing page is parsed once and handed out as a [`ProteinRows`]
//! iterator that consumes it. Walking a page again means fetching it again.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use scraper::ElementRef;
use thiserror::Error;

use crate::cazy::constants;
use crate::cazy::fetcher::Page;
use crate::cazy::pages::{selector, ParseError};
use crate::cazy::record::{FamilyName, GenbankAccessions, Kingdom, Organism, ProteinRow};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Row {position} at {url}: expected {expected} cells, found {found}")]
    CellCount { url: String, position: usize, expected: usize, found: usize },

    #[error("Row {position} at {url}: missing protein name")]
    MissingName { url: String, position: usize },

    #[error("Row {position} at {url}: cannot parse source organism '{text}'")]
    Organism { url: String, position: usize, text: String },

    #[error("Row {position} at {url}: no GenBank accession")]
    MissingGenbank { url: String, position: usize },
}

/// First page of a family listing: `GH1_all.html` or `GH1_bacteria.html`.
pub fn listing_url(home: &str, family: &FamilyName, kingdom: Option<Kingdom>) -> String {
    let suffix = kingdom.map(|k| k.page_suffix()).unwrap_or_else(|| "all".to_string());
    format!("{}/{}_{}.html", home, family.listing_name(), suffix)
}

fn offset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"{}=(\d+)", constants::OFFSET_PARAMETER)).expect("offset pattern is valid")
    })
}

/// URLs of every window from the first page up to the window at `last_offset`.
pub fn window_urls(first_url: &str, last_offset: usize) -> Vec<String> {
    let base = first_url.split(['?', '#']).next().unwrap_or(first_url);
    let mut urls = vec![first_url.to_string()];
    urls.extend(
        (constants::WINDOW_SIZE..=last_offset)
            .step_by(constants::WINDOW_SIZE)
            .map(|offset| {
                format!("{}?{}={}{}", base, constants::OFFSET_PARAMETER, offset, constants::PAGINATION_ANCHOR)
            }),
    );
    urls
}

/// Every window URL of a listing, given its first page.
pub fn pagination_windows(first: &Page) -> Result<Vec<String>, ParseError> {
    let document = first.document();
    let Some(last_page) = document.select(&selector(constants::LAST_PAGE_SELECTOR)).next() else {
        return Ok(vec![first.url.clone()]);
    };

    let href = last_page.value().attr("href").unwrap_or_default();
    let last_offset = offset_pattern()
        .captures(href)
        .and_then(|caps| caps[1].parse::<usize>().ok())
        .ok_or_else(|| ParseError::Malformed {
            url: first.url.clone(),
            detail: format!("last page link '{}' carries no {} offset", href, constants::OFFSET_PARAMETER),
        })?;

    Ok(window_urls(&first.url, last_offset))
}

/// A parsed listing page.
#[derive(Debug)]
pub struct ListingPage {
    url: String,
    rows: Vec<Result<ProteinRow, RowError>>,
    layout_errors: Vec<ParseError>,
}

impl ListingPage {
    /// Rows before any kingdom heading take `default_kingdom`, or
    /// [`Kingdom::Unclassified`] on the all-kingdom listing. Rows under an
    /// unrecognised heading are also unclassified and the heading is kept as
    /// a layout error of the page.
    pub fn parse(page: &Page, default_kingdom: Option<Kingdom>) -> Result<ListingPage, ParseError> {
        let document = page.document();
        let table = document
            .select(&selector(constants::LISTING_TABLE_SELECTOR))
            .next()
            .ok_or_else(|| ParseError::Structural {
                url: page.url.clone(),
                marker: constants::LISTING_TABLE_SELECTOR.to_string(),
            })?;

        let cell_selector = selector("td");
        let mut kingdom = default_kingdom.unwrap_or(Kingdom::Unclassified);
        let mut position = 0;
        let mut rows = Vec::new();
        let mut layout_errors = Vec::new();

        for tr in table.select(&selector("tr")) {
            let classes: Vec<&str> = tr.value().classes().collect();

            if classes.contains(&constants::KINGDOM_ROW_CLASS) {
                let Some(text) = first_text(&tr) else {
                    continue;
                };
                if text == constants::KINGDOM_ROW_NAVIGATION {
                    continue;
                }
                match Kingdom::from_str(&text) {
                    Ok(heading) => kingdom = heading,
                    Err(_) => {
                        layout_errors.push(ParseError::Malformed {
                            url: page.url.clone(),
                            detail: format!("unknown kingdom heading '{}'", text),
                        });
                        kingdom = Kingdom::Unclassified;
                    }
                }
                continue;
            }

            // title and navigation rows carry a class, protein rows do not
            if !classes.is_empty() || first_text(&tr).is_none() {
                continue;
            }

            let cells: Vec<ElementRef> = tr.select(&cell_selector).collect();
            match parse_row(&page.url, position, &cells, kingdom) {
                Ok((row, unlinked)) => {
                    if unlinked {
                        layout_errors.push(ParseError::Malformed {
                            url: page.url.clone(),
                            detail: format!("row {}: GenBank accession is not hyperlinked, first listed taken as primary", position),
                        });
                    }
                    rows.push(Ok(row));
                }
                Err(error) => rows.push(Err(error)),
            }
            position += 1;
        }

        Ok(ListingPage { url: page.url.clone(), rows, layout_errors })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Page-level layout anomalies that did not stop row parsing.
    pub fn layout_errors(&self) -> &[ParseError] {
        &self.layout_errors
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> ProteinRows {
        ProteinRows { url: self.url, inner: self.rows.into_iter() }
    }
}

/// Forward-only sequence of the rows of one listing page.
#[derive(Debug)]
pub struct ProteinRows {
    url: String,
    inner: std::vec::IntoIter<Result<ProteinRow, RowError>>,
}

impl ProteinRows {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Iterator for ProteinRows {
    type Item = Result<ProteinRow, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

fn first_text(element: &ElementRef) -> Option<String> {
    element
        .text()
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn tokens(cell: &ElementRef) -> Vec<String> {
    cell.text().flat_map(str::split_whitespace).map(str::to_string).collect()
}

fn link_texts(cell: &ElementRef) -> Vec<String> {
    cell.select(&selector("a"))
        .map(|a| cell_text(&a))
        .filter(|text| !text.is_empty())
        .collect()
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}

fn ec_numbers(cell: &ElementRef) -> Vec<String> {
    let mut ecs = link_texts(cell);
    if ecs.is_empty() {
        ecs = tokens(cell);
    }
    if ecs.is_empty() {
        ecs.push(constants::NO_EC_NUMBER.to_string());
    }
    dedup(ecs)
}

/// The hyperlinked accession is primary; other accession text in the cell
/// becomes non-primary synonyms. Without a hyperlink the first accession is
/// primary and the flag is set.
fn genbank_accessions(cell: &ElementRef) -> Option<(GenbankAccessions, bool)> {
    let all = dedup(tokens(cell));
    let (primary, unlinked) = match link_texts(cell).into_iter().next() {
        Some(linked) => (linked, false),
        None => (all.first().cloned()?, true),
    };
    let synonyms = all.into_iter().filter(|acc| *acc != primary).collect();
    Some((GenbankAccessions { primary, synonyms }, unlinked))
}

/// Linked accessions, or the cell's tokens with any `[chain]` suffix removed.
fn accessions(cell: &ElementRef) -> Vec<String> {
    let linked = link_texts(cell);
    if !linked.is_empty() {
        return dedup(linked);
    }
    let plain = tokens(cell)
        .into_iter()
        .map(|token| token.split('[').next().unwrap_or_default().to_string())
        .filter(|token| !token.is_empty())
        .collect();
    dedup(plain)
}

/// The flag is set when the primary GenBank accession had no hyperlink.
fn parse_row(
    url: &str,
    position: usize,
    cells: &[ElementRef],
    kingdom: Kingdom,
) -> Result<(ProteinRow, bool), RowError> {
    if cells.len() < constants::ROW_CELLS {
        return Err(RowError::CellCount {
            url: url.to_string(),
            position,
            expected: constants::ROW_CELLS,
            found: cells.len(),
        });
    }

    let name = cell_text(&cells[0]);
    if name.is_empty() {
        return Err(RowError::MissingName { url: url.to_string(), position });
    }

    let organism_text = cell_text(&cells[2]);
    let organism = Organism::parse(&organism_text).ok_or_else(|| RowError::Organism {
        url: url.to_string(),
        position,
        text: organism_text.clone(),
    })?;

    let (genbank, unlinked) = genbank_accessions(&cells[3])
        .ok_or_else(|| RowError::MissingGenbank { url: url.to_string(), position })?;

    let row = ProteinRow {
        position,
        name,
        ec_numbers: ec_numbers(&cells[1]),
        organism,
        kingdom,
        genbank,
        uniprot: accessions(&cells[4]),
        pdb: accessions(&cells[5]),
    };
    Ok((row, unlinked))
}
