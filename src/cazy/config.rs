use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::cazy::constants;
use crate::cazy::filter::{normalize_ec, Filters};
use crate::cazy::record::{ClassCode, FamilyName, Kingdom};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Regex pattern error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Unknown CAZy class: {0}")]
    UnknownClass(String),

    #[error("Unknown kingdom: {0} (expected one of archaea, bacteria, eukaryota, viruses, unclassified)")]
    UnknownKingdom(String),

    #[error("Invalid CAZy family name: {0}")]
    InvalidFamily(String),

    #[error("Invalid EC number: {0}")]
    InvalidEc(String),

    #[error("Invalid filter combination: {0}")]
    Conflict(String),

    #[error("No database URL configured (set DATABASE_URL or database_url)")]
    MissingDatabaseUrl,
}

///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: Option<String>,
    pub crawl: CrawlSettings,
    pub scope: ScopeSettings,
    pub filters: FilterSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub home_url: String,
    pub retries: u32,
    pub timeout_secs: u64,
    pub subfamilies: bool,
    pub complete_download: bool,
    pub page_workers: usize,
    pub log_dir: Option<PathBuf>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        CrawlSettings {
            home_url: constants::CAZY_HOME.to_string(),
            retries: constants::DEFAULT_RETRIES,
            timeout_secs: constants::DEFAULT_TIMEOUT_SECS,
            subfamilies: false,
            complete_download: false,
            page_workers: 1,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    /// Classes crawled in full.
    pub classes: Vec<String>,
    pub excluded_classes: Vec<String>,
    /// Families (or subfamilies) crawled; the owning class is taken from the prefix.
    pub families: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub genera: Vec<String>,
    pub species: Vec<String>,
    pub strains: Vec<String>,
    pub kingdoms: Vec<String>,
    pub ec_numbers: Vec<String>,
}

/// Command-line values that take precedence over the file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub classes: Option<Vec<String>>,
    pub excluded_classes: Option<Vec<String>>,
    pub families: Option<Vec<String>>,
    pub genera: Option<Vec<String>>,
    pub species: Option<Vec<String>>,
    pub strains: Option<Vec<String>>,
    pub kingdoms: Option<Vec<String>>,
    pub ec_numbers: Option<Vec<String>>,
    pub retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub subfamilies: Option<bool>,
    pub complete_download: Option<bool>,
    pub log_dir: Option<String>,
}

/// Layers the config file, the environment and command-line overrides.
pub fn load_settings(config: Option<&Path>, overrides: &Overrides) -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();

    let file = match config {
        Some(path) => File::from(path).required(true),
        None => File::with_name("assets/config").required(false),
    };

    let settings = ConfigBuilder::<DefaultState>::default()
        .add_source(file)
        .add_source(Environment::default())
        .set_override_option("database_url", overrides.database_url.clone())?
        .set_override_option("scope.classes", overrides.classes.clone())?
        .set_override_option("scope.excluded_classes", overrides.excluded_classes.clone())?
        .set_override_option("scope.families", overrides.families.clone())?
        .set_override_option("filters.genera", overrides.genera.clone())?
        .set_override_option("filters.species", overrides.species.clone())?
        .set_override_option("filters.strains", overrides.strains.clone())?
        .set_override_option("filters.kingdoms", overrides.kingdoms.clone())?
        .set_override_option("filters.ec_numbers", overrides.ec_numbers.clone())?
        .set_override_option("crawl.retries", overrides.retries.map(u64::from))?
        .set_override_option("crawl.timeout_secs", overrides.timeout_secs)?
        .set_override_option("crawl.subfamilies", overrides.subfamilies)?
        .set_override_option("crawl.complete_download", overrides.complete_download)?
        .set_override_option("crawl.log_dir", overrides.log_dir.clone())?
        .build()?;

    Ok(settings.try_deserialize()?)
}

///////////////////////////////////////////////////////////////////////////////

/// Which classes and families a crawl visits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Empty means every class; `None` means every family of that class.
    pub classes: BTreeMap<ClassCode, Option<BTreeSet<String>>>,
    pub excluded: BTreeSet<ClassCode>,
}

impl Scope {
    pub fn is_unrestricted(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn includes_class(&self, class: ClassCode) -> bool {
        !self.excluded.contains(&class) && (self.classes.is_empty() || self.classes.contains_key(&class))
    }

    /// Family names match case-sensitively. With subfamilies enabled a
    /// subfamily also matches when only its parent family is named.
    pub fn includes_family(&self, class: ClassCode, name: &str, subfamilies: bool) -> bool {
        if !self.includes_class(class) {
            return false;
        }
        let named = match self.classes.get(&class) {
            None | Some(None) => return true,
            Some(Some(named)) => named,
        };
        if named.contains(name) {
            return true;
        }
        match name.find('_') {
            Some(idx) if subfamilies => named.contains(&name[..idx]),
            _ => false,
        }
    }

    /// Number of classes crawled in full.
    pub fn complete_classes(&self) -> usize {
        if self.is_unrestricted() {
            return ClassCode::all().filter(|c| !self.excluded.contains(c)).count();
        }
        self.classes.values().filter(|families| families.is_none()).count()
    }

    pub fn named_families(&self) -> usize {
        self.classes.values().flatten().map(BTreeSet::len).sum()
    }

    pub fn class_names(&self) -> Vec<String> {
        self.classes
            .iter()
            .filter(|(_, families)| families.is_none())
            .map(|(class, _)| class.to_string())
            .collect()
    }

    pub fn family_names(&self) -> Vec<String> {
        self.classes.values().flatten().flatten().cloned().collect()
    }
}

/// Validated configuration of one crawl.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub database_url: String,
    pub home_url: String,
    pub scope: Scope,
    pub filters: Filters,
    pub subfamilies: bool,
    pub retries: u32,
    pub timeout: Duration,
    pub complete_download: bool,
    pub page_workers: usize,
    pub log_dir: Option<PathBuf>,
}

impl CrawlConfig {
    pub fn from_settings(settings: Settings) -> Result<CrawlConfig, ConfigError> {
        let database_url = settings
            .database_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;

        let scope = build_scope(&settings.scope)?;
        let filters = build_filters(&settings.filters)?;

        Ok(CrawlConfig {
            database_url,
            home_url: settings.crawl.home_url.trim_end_matches('/').to_string(),
            scope,
            filters,
            subfamilies: settings.crawl.subfamilies,
            retries: settings.crawl.retries,
            timeout: Duration::from_secs(settings.crawl.timeout_secs),
            complete_download: settings.crawl.complete_download,
            page_workers: settings.crawl.page_workers.max(1),
            log_dir: settings.crawl.log_dir,
        })
    }

    /// Large requests are throttled to one request per second.
    pub fn is_large_download(&self) -> bool {
        let classes = self.scope.complete_classes();
        let families = self.scope.named_families();
        self.complete_download
            || classes > constants::LARGE_CLASS_COUNT
            || (families > constants::LARGE_FAMILY_COUNT && classes >= constants::LARGE_CLASS_COUNT)
    }
}

fn split_terms(values: &[String]) -> impl Iterator<Item = &str> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn resolve_class(name: &str) -> Result<ClassCode, ConfigError> {
    ClassCode::resolve(name).ok_or_else(|| ConfigError::UnknownClass(name.to_string()))
}

fn build_scope(settings: &ScopeSettings) -> Result<Scope, ConfigError> {
    let mut scope = Scope::default();

    for name in split_terms(&settings.excluded_classes) {
        scope.excluded.insert(resolve_class(name)?);
    }

    for name in split_terms(&settings.classes) {
        let class = resolve_class(name)?;
        if scope.excluded.contains(&class) {
            return Err(ConfigError::Conflict(format!("class {} is both included and excluded", class)));
        }
        scope.classes.insert(class, None);
    }

    for name in split_terms(&settings.families) {
        FamilyName::parse(name).ok_or_else(|| ConfigError::InvalidFamily(name.to_string()))?;
        let class = ClassCode::of_family(name).ok_or_else(|| ConfigError::InvalidFamily(name.to_string()))?;
        if scope.excluded.contains(&class) {
            return Err(ConfigError::Conflict(format!("family {} belongs to excluded class {}", name, class)));
        }
        match scope.classes.entry(class).or_insert_with(|| Some(BTreeSet::new())) {
            Some(families) => {
                families.insert(name.to_string());
            }
            // The whole class is already requested.
            None => {}
        }
    }

    Ok(scope)
}

fn build_filters(settings: &FilterSettings) -> Result<Filters, ConfigError> {
    let ec_pattern = Regex::new(r"^\d+\.(\d+|-)\.(\d+|-)\.(n?\d+|-)$")?;

    let mut filters = Filters {
        genera: split_terms(&settings.genera).map(str::to_string).collect(),
        species: split_terms(&settings.species).map(str::to_string).collect(),
        strains: split_terms(&settings.strains).map(str::to_string).collect(),
        ..Default::default()
    };

    for name in split_terms(&settings.kingdoms) {
        let kingdom = Kingdom::from_str(name).map_err(|_| ConfigError::UnknownKingdom(name.to_string()))?;
        filters.kingdoms.insert(kingdom);
    }

    for ec in split_terms(&settings.ec_numbers) {
        let normalized = normalize_ec(ec);
        if !ec_pattern.is_match(&normalized) {
            return Err(ConfigError::InvalidEc(ec.to_string()));
        }
        filters.ec_numbers.insert(normalized);
    }

    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            database_url: Some("sqlite://cazy.db".to_string()),
            ..Default::default()
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_are_unrestricted() {
        let config = CrawlConfig::from_settings(settings()).unwrap();
        assert!(config.scope.is_unrestricted());
        assert!(config.filters.is_unrestricted());
        assert_eq!(config.retries, 10);
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert_eq!(config.home_url, "http://www.cazy.org");
        // every class is crawled, so the throttle engages
        assert!(config.is_large_download());
    }

    #[test]
    fn families_are_grouped_by_class_prefix() {
        let mut settings = settings();
        settings.scope.families = strings(&["GH1, GH5_1", "PL9"]);
        settings.scope.classes = strings(&["Carbohydrate Esterases"]);
        let config = CrawlConfig::from_settings(settings).unwrap();

        let gh = ClassCode::resolve("GH").unwrap();
        let ce = ClassCode::resolve("CE").unwrap();
        let aa = ClassCode::resolve("AA").unwrap();
        assert!(config.scope.includes_family(gh, "GH1", false));
        assert!(config.scope.includes_family(gh, "GH5_1", false));
        assert!(!config.scope.includes_family(gh, "GH2", false));
        assert!(config.scope.includes_family(ce, "CE4", false));
        assert!(!config.scope.includes_class(aa));
        assert_eq!(config.scope.complete_classes(), 1);
        assert_eq!(config.scope.named_families(), 3);
        assert!(!config.is_large_download());
    }

    #[test]
    fn parent_family_selects_subfamilies_when_enabled() {
        let mut settings = settings();
        settings.scope.families = strings(&["GH5"]);
        let config = CrawlConfig::from_settings(settings).unwrap();
        let gh = ClassCode::resolve("GH").unwrap();
        assert!(config.scope.includes_family(gh, "GH5_4", true));
        assert!(!config.scope.includes_family(gh, "GH5_4", false));
        assert!(!config.scope.includes_family(gh, "GH51", true));
    }

    #[test]
    fn unknown_kingdom_is_fatal() {
        let mut settings = settings();
        settings.filters.kingdoms = strings(&["Bacteria,Plantae"]);
        assert!(matches!(
            CrawlConfig::from_settings(settings),
            Err(ConfigError::UnknownKingdom(k)) if k == "Plantae"
        ));
    }

    #[test]
    fn kingdoms_and_ec_numbers_are_normalized() {
        let mut settings = settings();
        settings.filters.kingdoms = strings(&["bacteria", "ARCHAEA"]);
        settings.filters.ec_numbers = strings(&["EC3.2.1.4", "3.2.1.-"]);
        let config = CrawlConfig::from_settings(settings).unwrap();
        assert!(config.filters.kingdoms.contains(&Kingdom::Bacteria));
        assert!(config.filters.kingdoms.contains(&Kingdom::Archaea));
        assert!(config.filters.ec_numbers.contains("3.2.1.4"));
        assert!(config.filters.ec_numbers.contains("3.2.1.-"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut bad_ec = settings();
        bad_ec.filters.ec_numbers = strings(&["cellulase"]);
        assert!(matches!(CrawlConfig::from_settings(bad_ec), Err(ConfigError::InvalidEc(_))));

        let mut bad_class = settings();
        bad_class.scope.classes = strings(&["Genomes"]);
        assert!(matches!(CrawlConfig::from_settings(bad_class), Err(ConfigError::UnknownClass(_))));

        let mut conflict = settings();
        conflict.scope.excluded_classes = strings(&["GH"]);
        conflict.scope.families = strings(&["GH1"]);
        assert!(matches!(CrawlConfig::from_settings(conflict), Err(ConfigError::Conflict(_))));

        let mut no_db = settings();
        no_db.database_url = None;
        assert!(matches!(CrawlConfig::from_settings(no_db), Err(ConfigError::MissingDatabaseUrl)));
    }

    #[test]
    fn large_download_heuristic() {
        let mut three_classes = settings();
        three_classes.scope.classes = strings(&["GH", "GT", "PL"]);
        assert!(CrawlConfig::from_settings(three_classes).unwrap().is_large_download());

        let mut two_classes_many_families = settings();
        two_classes_many_families.scope.classes = strings(&["GH", "GT"]);
        two_classes_many_families.scope.families = strings(&["PL1", "PL2", "PL3", "CE1", "CE2", "CE3"]);
        assert!(CrawlConfig::from_settings(two_classes_many_families).unwrap().is_large_download());

        let mut one_class_many_families = settings();
        one_class_many_families.scope.classes = strings(&["GH"]);
        one_class_many_families.scope.families = strings(&["PL1", "PL2", "PL3", "CE1", "CE2", "CE3"]);
        assert!(!CrawlConfig::from_settings(one_class_many_families).unwrap().is_large_download());
    }
}
