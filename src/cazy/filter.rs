//! Taxonomy, kingdom and EC number filters.
//!
//! The same predicate gates rows during a crawl and CAZymes read back from
//! the store, so anything that can be filtered implements [`FilterSubject`].

use std::collections::BTreeSet;

use crate::cazy::constants;
use crate::cazy::record::{Kingdom, ProteinRow};

pub trait FilterSubject {
    /// `genus species[ strain]`
    fn organism_name(&self) -> String;
    fn kingdom(&self) -> Option<Kingdom>;
    fn ec_numbers(&self) -> Vec<String>;
}

impl FilterSubject for ProteinRow {
    fn organism_name(&self) -> String {
        self.organism.full_name()
    }

    fn kingdom(&self) -> Option<Kingdom> {
        Some(self.kingdom)
    }

    fn ec_numbers(&self) -> Vec<String> {
        self.known_ec_numbers().map(str::to_string).collect()
    }
}

/// Strips an `EC` prefix and surrounding whitespace.
pub fn normalize_ec(ec: &str) -> String {
    let ec = ec.trim();
    let ec = match ec.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("EC") => &ec[2..],
        _ => ec,
    };
    ec.trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub genera: BTreeSet<String>,
    pub species: BTreeSet<String>,
    pub strains: BTreeSet<String>,
    pub kingdoms: BTreeSet<Kingdom>,
    /// Normalized with [`normalize_ec`].
    pub ec_numbers: BTreeSet<String>,
}

impl Filters {
    pub fn is_unrestricted(&self) -> bool {
        !self.has_taxonomy() && self.kingdoms.is_empty() && self.ec_numbers.is_empty()
    }

    pub fn has_taxonomy(&self) -> bool {
        !(self.genera.is_empty() && self.species.is_empty() && self.strains.is_empty())
    }

    fn taxonomy_terms(&self) -> impl Iterator<Item = &str> {
        self.genera
            .iter()
            .chain(self.species.iter())
            .chain(self.strains.iter())
            .map(String::as_str)
    }

    pub fn accepts_taxonomy(&self, organism: &str) -> bool {
        if !self.has_taxonomy() {
            return true;
        }
        self.taxonomy_terms().any(|term| organism.contains(term))
    }

    pub fn accepts_kingdom(&self, kingdom: Option<Kingdom>) -> bool {
        if self.kingdoms.is_empty() {
            return true;
        }
        match kingdom {
            Some(kingdom) => self.kingdoms.contains(&kingdom),
            None => false,
        }
    }

    pub fn accepts_ec<S: AsRef<str>>(&self, ec_numbers: &[S]) -> bool {
        if self.ec_numbers.is_empty() {
            return true;
        }
        ec_numbers
            .iter()
            .map(|ec| normalize_ec(ec.as_ref()))
            .filter(|ec| ec != constants::NO_EC_NUMBER)
            .any(|ec| self.ec_numbers.contains(&ec))
    }

    /// Logical AND of whichever filters are configured.
    pub fn accepts<S: FilterSubject + ?Sized>(&self, subject: &S) -> bool {
        self.accepts_taxonomy(&subject.organism_name())
            && self.accepts_kingdom(subject.kingdom())
            && self.accepts_ec(&subject.ec_numbers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cazy::record::{GenbankAccessions, Organism};

    fn row(organism: &str, kingdom: Kingdom, ecs: &[&str]) -> ProteinRow {
        ProteinRow {
            position: 0,
            name: "protein".to_string(),
            ec_numbers: ecs.iter().map(|s| s.to_string()).collect(),
            organism: Organism::parse(organism).unwrap(),
            kingdom,
            genbank: GenbankAccessions { primary: "AAA1.1".to_string(), synonyms: vec![] },
            uniprot: vec![],
            pdb: vec![],
        }
    }

    #[test]
    fn no_filters_accepts_everything() {
        let filters = Filters::default();
        assert!(filters.is_unrestricted());
        assert!(filters.accepts(&row("Foo bar", Kingdom::Archaea, &["N/A"])));
        assert!(filters.accepts(&row("Baz qux", Kingdom::Viruses, &["3.2.1.4"])));
    }

    #[test]
    fn kingdom_only_rejects_other_kingdoms() {
        let filters = Filters {
            kingdoms: [Kingdom::Bacteria].into_iter().collect(),
            ..Default::default()
        };
        assert!(filters.accepts(&row("Foo bar", Kingdom::Bacteria, &["N/A"])));
        for kingdom in [Kingdom::Archaea, Kingdom::Eukaryota, Kingdom::Viruses, Kingdom::Unclassified] {
            assert!(!filters.accepts(&row("Foo bar", kingdom, &["N/A"])));
        }
        assert!(!filters.accepts_kingdom(None));
    }

    #[test]
    fn taxonomy_matches_substrings_of_full_name() {
        let filters = Filters {
            genera: ["Aspergillus".to_string()].into_iter().collect(),
            strains: ["Bacillus subtilis str. 168".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(filters.accepts(&row("Aspergillus niger", Kingdom::Eukaryota, &["N/A"])));
        assert!(filters.accepts(&row("Bacillus subtilis str. 168", Kingdom::Bacteria, &["N/A"])));
        assert!(!filters.accepts(&row("Bacillus subtilis", Kingdom::Bacteria, &["N/A"])));
    }

    #[test]
    fn ec_filter_needs_intersection() {
        let filters = Filters {
            ec_numbers: ["3.2.1.4".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(filters.accepts(&row("Foo bar", Kingdom::Bacteria, &["3.2.1.21", "EC3.2.1.4"])));
        assert!(!filters.accepts(&row("Foo bar", Kingdom::Bacteria, &["3.2.1.21"])));
        assert!(!filters.accepts(&row("Foo bar", Kingdom::Bacteria, &["N/A"])));
    }

    #[test]
    fn combined_filters_are_conjunctive() {
        let filters = Filters {
            genera: ["Foo".to_string()].into_iter().collect(),
            kingdoms: [Kingdom::Bacteria].into_iter().collect(),
            ec_numbers: ["3.2.1.-".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(filters.accepts(&row("Foo bar", Kingdom::Bacteria, &["3.2.1.-"])));
        assert!(!filters.accepts(&row("Foo bar", Kingdom::Archaea, &["3.2.1.-"])));
        assert!(!filters.accepts(&row("Qux bar", Kingdom::Bacteria, &["3.2.1.-"])));
    }

    #[test]
    fn normalize_ec_strips_prefix() {
        assert_eq!(normalize_ec(" EC3.2.1.4 "), "3.2.1.4");
        assert_eq!(normalize_ec("ec 1.1.1.-"), "1.1.1.-");
        assert_eq!(normalize_ec("N/A"), "N/A");
    }
}
