use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::cazy::constants;

/// Top-level taxonomic domains CAZy groups its listings by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Kingdom {
    Archaea,
    Bacteria,
    Eukaryota,
    Viruses,
    Unclassified,
}

impl Kingdom {
    /// Suffix of the per-kingdom listing page, e.g. `GH1_bacteria.html`.
    pub fn page_suffix(&self) -> String {
        self.as_ref().to_lowercase()
    }
}

/// A CAZy class code such as `GH` or `CBM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassCode(&'static str);

impl ClassCode {
    pub fn all() -> impl Iterator<Item = ClassCode> {
        constants::CLASSES.iter().map(|(code, _, _)| ClassCode(code))
    }

    /// Resolves a class code or one of its synonyms, ignoring case.
    pub fn resolve(name: &str) -> Option<ClassCode> {
        let name = name.trim();
        constants::CLASSES
            .iter()
            .find(|(code, stem, synonyms)| {
                code.eq_ignore_ascii_case(name)
                    || stem.eq_ignore_ascii_case(name)
                    || synonyms.iter().any(|s| s.eq_ignore_ascii_case(name))
            })
            .map(|(code, _, _)| ClassCode(code))
    }

    /// Resolves the class owning a family name by its letter prefix.
    pub fn of_family(family: &str) -> Option<ClassCode> {
        let prefix: String = family.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        constants::CLASSES
            .iter()
            .find(|(code, _, _)| *code == prefix)
            .map(|(code, _, _)| ClassCode(code))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    pub fn page_stem(&self) -> &'static str {
        constants::CLASSES
            .iter()
            .find(|(code, _, _)| *code == self.0)
            .map(|(_, stem, _)| *stem)
            .unwrap_or(self.0)
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

fn family_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<family>[A-Z]+\d+)(?P<sub>_\d+)?$").expect("family pattern is valid")
    })
}

/// Natural key of a catalogued family: `GH5` or `GH5` + `GH5_1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FamilyName {
    pub family: String,
    pub subfamily: Option<String>,
}

impl FamilyName {
    pub fn parse(name: &str) -> Option<FamilyName> {
        let caps = family_pattern().captures(name.trim())?;
        let family = caps.name("family")?.as_str().to_string();
        let subfamily = caps.name("sub").map(|_| name.trim().to_string());
        Some(FamilyName { family, subfamily })
    }

    /// The listing name: the subfamily when present, otherwise the family.
    pub fn listing_name(&self) -> &str {
        self.subfamily.as_deref().unwrap_or(&self.family)
    }
}

impl fmt::Display for FamilyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.listing_name())
    }
}

/// Source organism split into genus and the remainder (species, maybe strain).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Organism {
    pub genus: String,
    pub species: String,
}

impl Organism {
    pub fn parse(text: &str) -> Option<Organism> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut parts = text.splitn(2, ' ');
        let genus = parts.next().filter(|g| !g.is_empty())?.to_string();
        let species = parts.next().unwrap_or("").to_string();
        Some(Organism { genus, species })
    }

    pub fn full_name(&self) -> String {
        if self.species.is_empty() {
            self.genus.clone()
        } else {
            format!("{} {}", self.genus, self.species)
        }
    }
}

/// GenBank accessions of a row: the hyperlinked one plus plain-text synonyms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenbankAccessions {
    pub primary: String,
    pub synonyms: Vec<String>,
}

/// One protein row of a family listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProteinRow {
    /// Zero-based position of the row on its listing page.
    pub position: usize,
    pub name: String,
    /// `["N/A"]` when the source lists no EC number.
    pub ec_numbers: Vec<String>,
    pub organism: Organism,
    pub kingdom: Kingdom,
    pub genbank: GenbankAccessions,
    /// First entry is the primary accession.
    pub uniprot: Vec<String>,
    /// First entry is the primary accession.
    pub pdb: Vec<String>,
}

impl ProteinRow {
    /// EC numbers without the `N/A` placeholder.
    pub fn known_ec_numbers(&self) -> impl Iterator<Item = &str> {
        self.ec_numbers
            .iter()
            .map(String::as_str)
            .filter(|ec| *ec != constants::NO_EC_NUMBER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kingdom_parses_case_insensitively() {
        assert_eq!(Kingdom::from_str("bacteria").unwrap(), Kingdom::Bacteria);
        assert_eq!(Kingdom::from_str("VIRUSES").unwrap(), Kingdom::Viruses);
        assert!(Kingdom::from_str("Plantae").is_err());
        assert_eq!(Kingdom::Eukaryota.page_suffix(), "eukaryota");
    }

    #[test]
    fn class_code_resolves_synonyms() {
        assert_eq!(ClassCode::resolve("gh").unwrap().as_str(), "GH");
        assert_eq!(ClassCode::resolve("Glycoside Hydrolases").unwrap().as_str(), "GH");
        assert_eq!(ClassCode::resolve("Carbohydrate-Binding-Modules").unwrap().as_str(), "CBM");
        assert!(ClassCode::resolve("Genomes").is_none());
        assert_eq!(ClassCode::of_family("CBM50").unwrap().as_str(), "CBM");
        assert_eq!(ClassCode::of_family("GH5_1").unwrap().as_str(), "GH");
        assert!(ClassCode::of_family("XX1").is_none());
    }

    #[test]
    fn family_name_splits_subfamily() {
        let fam = FamilyName::parse("GH5_12").unwrap();
        assert_eq!(fam.family, "GH5");
        assert_eq!(fam.subfamily.as_deref(), Some("GH5_12"));
        assert_eq!(fam.listing_name(), "GH5_12");

        let fam = FamilyName::parse("PL1").unwrap();
        assert_eq!(fam.subfamily, None);
        assert!(FamilyName::parse("gh1").is_none());
    }

    #[test]
    fn organism_keeps_strain_with_species() {
        let org = Organism::parse("  Bacillus subtilis   str. 168 ").unwrap();
        assert_eq!(org.genus, "Bacillus");
        assert_eq!(org.species, "subtilis str. 168");
        assert_eq!(org.full_name(), "Bacillus subtilis str. 168");
        assert!(Organism::parse("   ").is_none());
    }
}
