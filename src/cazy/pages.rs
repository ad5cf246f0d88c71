//! Parsers for the CAZy home page (class index) and class pages (family index).

use std::collections::{BTreeSet, HashSet};

use regex::Regex;
use scraper::{ElementRef, Selector};
use thiserror::Error;
use tracing::debug;

use crate::cazy::constants;
use crate::cazy::fetcher::Page;
use crate::cazy::record::{ClassCode, FamilyName};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected page layout at {url}: {marker} not found")]
    Structural { url: String, marker: String },

    #[error("Unexpected page layout at {url}: {detail}")]
    Malformed { url: String, detail: String },
}

impl ParseError {
    pub fn url(&self) -> &str {
        match self {
            ParseError::Structural { url, .. } | ParseError::Malformed { url, .. } => url,
        }
    }
}

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("selectors are compile-time constants")
}

/// Strips the site prefix and leading slashes from a link target.
pub(crate) fn relative_href<'a>(href: &'a str, home: &str) -> &'a str {
    href.strip_prefix(home).unwrap_or(href).trim_start_matches('/')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLink {
    pub code: ClassCode,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FamilyLink {
    pub name: FamilyName,
    pub class: ClassCode,
    pub url: String,
}

/// Class links of the home page, in page order.
pub fn parse_class_index(
    page: &Page,
    home: &str,
    excluded: &BTreeSet<ClassCode>,
) -> Result<Vec<ClassLink>, ParseError> {
    let document = page.document();
    let anchors: Vec<ElementRef> = document.select(&selector(constants::CLASS_LINK_SELECTOR)).collect();

    if anchors.is_empty() {
        return Err(ParseError::Structural {
            url: page.url.clone(),
            marker: constants::CLASS_LINK_SELECTOR.to_string(),
        });
    }

    let mut seen = HashSet::new();
    let mut classes = Vec::new();

    for anchor in anchors {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = anchor.text().collect::<String>();
        let text = text.trim();

        if href.starts_with("http") && !href.starts_with(home) {
            continue;
        }
        if constants::CLASS_DENYLIST.iter().any(|denied| text.contains(denied)) {
            continue;
        }

        let target = relative_href(href, home);
        let stem = target.trim_end_matches(".html");
        let Some(code) = ClassCode::resolve(stem).or_else(|| ClassCode::resolve(text)) else {
            debug!(href, text, "Skipping link that is not a CAZy class");
            continue;
        };

        if excluded.contains(&code) || !seen.insert(code) {
            continue;
        }

        classes.push(ClassLink {
            code,
            url: format!("{}/{}", home, target),
        });
    }

    Ok(classes)
}

/// Family links listed in the "direct access" section of a class page.
pub fn parse_family_index(
    page: &Page,
    home: &str,
    class: ClassCode,
    subfamilies: bool,
) -> Result<Vec<FamilyLink>, ParseError> {
    let family_pattern = Regex::new(constants::FAMILY_HREF_PATTERN).expect("family href pattern is valid");
    let subfamily_pattern = Regex::new(constants::SUBFAMILY_HREF_PATTERN).expect("subfamily href pattern is valid");

    let document = page.document();
    let heading = document
        .select(&selector("h1, h2, h3, h4, h5, h6"))
        .find(|h| h.text().collect::<String>().contains(constants::DIRECT_ACCESS_HEADING));

    let section = heading
        .and_then(|h| h.parent())
        .and_then(ElementRef::wrap)
        .ok_or_else(|| ParseError::Structural {
            url: page.url.clone(),
            marker: constants::DIRECT_ACCESS_HEADING.to_string(),
        })?;

    let mut seen = HashSet::new();
    let mut families = Vec::new();

    for anchor in section.select(&selector("a[href]")) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let target = relative_href(href, home);

        let name = if let Some(caps) = family_pattern.captures(target) {
            caps["name"].to_string()
        } else if let Some(caps) = subfamily_pattern.captures(target).filter(|_| subfamilies) {
            caps["name"].to_string()
        } else {
            continue;
        };

        let Some(family) = FamilyName::parse(&name) else {
            continue;
        };
        if ClassCode::of_family(&name) != Some(class) || !seen.insert(name.clone()) {
            continue;
        }

        families.push(FamilyLink {
            name: family,
            class,
            url: format!("{}/{}", home, target),
        });
    }

    debug!(class = %class, count = families.len(), "Parsed family index");
    Ok(families)
}
