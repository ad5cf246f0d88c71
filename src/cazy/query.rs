//! Read side of the store for downstream consumers.
//!
//! Selection reuses [`Scope`] for families and classes and the crawl's own
//! [`Filters`] predicate for taxonomy, kingdom and EC numbers, so a query
//! returns exactly what a crawl with the same settings would have kept.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use diesel::prelude::*;
use log::debug;

use crate::cazy::config::Scope;
use crate::cazy::filter::{FilterSubject, Filters};
use crate::cazy::record::{ClassCode, FamilyName, Kingdom};
use crate::schema::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accession {
    pub accession: String,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CazymeRecord {
    pub cazyme_id: i32,
    pub name: String,
    pub genus: String,
    pub species: String,
    pub kingdom: Option<Kingdom>,
    /// `(class, family)` pairs, subfamilies by their full name.
    pub families: Vec<(ClassCode, FamilyName)>,
    pub ec_numbers: Vec<String>,
    pub genbank: Vec<Accession>,
    pub uniprot: Vec<Accession>,
    pub pdb: Vec<Accession>,
}

impl CazymeRecord {
    fn new(cazyme_id: i32, name: String, genus: String, species: String, kingdom: &str) -> Self {
        CazymeRecord {
            cazyme_id,
            name,
            genus,
            species,
            kingdom: Kingdom::from_str(kingdom).ok(),
            families: Vec::new(),
            ec_numbers: Vec::new(),
            genbank: Vec::new(),
            uniprot: Vec::new(),
            pdb: Vec::new(),
        }
    }

    pub fn primary_genbank(&self) -> Option<&str> {
        self.genbank.iter().find(|a| a.primary).map(|a| a.accession.as_str())
    }

    pub fn in_scope(&self, scope: &Scope, subfamilies: bool) -> bool {
        self.families
            .iter()
            .any(|(class, family)| scope.includes_family(*class, family.listing_name(), subfamilies))
    }
}

impl FilterSubject for CazymeRecord {
    fn organism_name(&self) -> String {
        if self.species.is_empty() {
            self.genus.clone()
        } else {
            format!("{} {}", self.genus, self.species)
        }
    }

    fn kingdom(&self) -> Option<Kingdom> {
        self.kingdom
    }

    fn ec_numbers(&self) -> Vec<String> {
        self.ec_numbers.clone()
    }
}

/// Every CAZyme linked to a family in `scope` that passes `filters`.
pub fn cazymes(
    connection: &mut SqliteConnection,
    scope: &Scope,
    subfamilies: bool,
    filters: &Filters,
) -> QueryResult<Vec<CazymeRecord>> {
    let rows: Vec<(i32, String, String, String, String)> = cazymes::table
        .inner_join(taxs::table.inner_join(kingdoms::table))
        .select((
            cazymes::cazyme_id,
            cazymes::cazyme_name,
            taxs::genus,
            taxs::species,
            kingdoms::kingdom,
        ))
        .order(cazymes::cazyme_id)
        .load(connection)?;

    let mut records: BTreeMap<i32, CazymeRecord> = rows
        .into_iter()
        .map(|(id, name, genus, species, kingdom)| (id, CazymeRecord::new(id, name, genus, species, &kingdom)))
        .collect();

    let family_links: Vec<(i32, String, Option<String>, String)> = cazymes_families::table
        .inner_join(families::table)
        .select((
            cazymes_families::cazyme_id,
            families::family,
            families::subfamily,
            families::class_code,
        ))
        .load(connection)?;
    for (id, family, subfamily, class_code) in family_links {
        let Some(class) = ClassCode::resolve(&class_code) else {
            continue;
        };
        if let Some(record) = records.get_mut(&id) {
            record.families.push((class, FamilyName { family, subfamily }));
        }
    }

    let ec_links: Vec<(i32, String)> = cazymes_ecs::table
        .inner_join(ecs::table)
        .select((cazymes_ecs::cazyme_id, ecs::ec_number))
        .load(connection)?;
    for (id, ec) in ec_links {
        if let Some(record) = records.get_mut(&id) {
            record.ec_numbers.push(ec);
        }
    }

    let genbank_links: Vec<(i32, String, bool)> = cazymes_genbanks::table
        .inner_join(genbanks::table)
        .select((cazymes_genbanks::cazyme_id, genbanks::genbank_accession, cazymes_genbanks::is_primary))
        .order(cazymes_genbanks::link_id)
        .load(connection)?;
    attach(&mut records, genbank_links, |record| &mut record.genbank);

    let uniprot_links: Vec<(i32, String, bool)> = cazymes_uniprots::table
        .inner_join(uniprots::table)
        .select((cazymes_uniprots::cazyme_id, uniprots::uniprot_accession, uniprots::is_primary))
        .load(connection)?;
    attach(&mut records, uniprot_links, |record| &mut record.uniprot);

    let pdb_links: Vec<(i32, String, bool)> = cazymes_pdbs::table
        .inner_join(pdbs::table)
        .select((cazymes_pdbs::cazyme_id, pdbs::pdb_accession, pdbs::is_primary))
        .load(connection)?;
    attach(&mut records, pdb_links, |record| &mut record.pdb);

    let total = records.len();
    let selected: Vec<CazymeRecord> = records
        .into_values()
        .filter(|record| record.in_scope(scope, subfamilies) && filters.accepts(record))
        .map(|mut record| {
            record.uniprot.sort_by_key(|a| !a.primary);
            record.pdb.sort_by_key(|a| !a.primary);
            record
        })
        .collect();

    debug!("Selected {} of {} CAZymes", selected.len(), total);
    Ok(selected)
}

fn attach<F>(records: &mut BTreeMap<i32, CazymeRecord>, links: Vec<(i32, String, bool)>, field: F)
where
    F: Fn(&mut CazymeRecord) -> &mut Vec<Accession>,
{
    for (id, accession, primary) in links {
        if let Some(record) = records.get_mut(&id) {
            field(record).push(Accession { accession, primary });
        }
    }
}

/// Distinct families that have at least one CAZyme, for listings.
pub fn populated_families(connection: &mut SqliteConnection) -> QueryResult<BTreeSet<String>> {
    let rows: Vec<(String, Option<String>)> = families::table
        .inner_join(cazymes_families::table)
        .select((families::family, families::subfamily))
        .distinct()
        .load(connection)?;

    Ok(rows
        .into_iter()
        .map(|(family, subfamily)| subfamily.unwrap_or(family))
        .collect())
}
