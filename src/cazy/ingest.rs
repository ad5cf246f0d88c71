use std::collections::HashMap;

use diesel::prelude::*;
use log::debug;
use thiserror::Error;

use crate::cazy::record::{ClassCode, FamilyName, ProteinRow};
use crate::cazy::store;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to store '{name}' ({url}, row {position}): {source}")]
    Database {
        name: String,
        url: String,
        position: usize,
        #[source]
        source: diesel::result::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created(i32),
    /// The row was already merged earlier in this session.
    Extended(i32),
}

impl MergeOutcome {
    pub fn cazyme_id(&self) -> i32 {
        match self {
            MergeOutcome::Created(id) | MergeOutcome::Extended(id) => *id,
        }
    }
}

#[derive(Debug, Clone)]
struct Merged {
    cazyme_id: i32,
    name: String,
    taxonomy_id: i32,
    family_id: i32,
}

/// Folds parsed rows into the store, one transaction per row.
///
/// Rows are not deduplicated by accession. A row becomes a new CAZyme unless
/// the same listing position of the same family was merged earlier in this
/// session with the same name and taxonomy. Positions are remembered until
/// [`Ingestor::finish_family`] is called for the family.
#[derive(Debug, Default)]
pub struct Ingestor {
    seen: HashMap<FamilyName, HashMap<(String, usize), Merged>>,
}

impl Ingestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the listing positions merged for `family`.
    pub fn finish_family(&mut self, family: &FamilyName) {
        self.seen.remove(family);
    }

    /// Listing positions currently remembered across all families.
    pub fn remembered(&self) -> usize {
        self.seen.values().map(HashMap::len).sum()
    }

    pub fn merge(
        &mut self,
        connection: &mut SqliteConnection,
        family: &FamilyName,
        class: ClassCode,
        page_url: &str,
        row: &ProteinRow,
    ) -> Result<MergeOutcome, IngestError> {
        let key = (page_url.to_string(), row.position);
        let previous = self.seen.get(family).and_then(|rows| rows.get(&key));

        let merged = connection
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let kingdom_id = store::kingdom_id(conn, row.kingdom)?;
                let taxonomy_id = store::taxonomy_id(conn, &row.organism, kingdom_id)?;
                let family_id = store::family_id(conn, family, class)?;

                let known = match previous {
                    Some(seen)
                        if seen.name == row.name
                            && seen.taxonomy_id == taxonomy_id
                            && seen.family_id == family_id
                            && store::cazyme_exists(conn, seen.cazyme_id)? =>
                    {
                        Some(seen.cazyme_id)
                    }
                    _ => None,
                };

                let (cazyme_id, created) = match known {
                    Some(id) => (id, false),
                    None => (store::insert_cazyme(conn, &row.name, taxonomy_id)?, true),
                };

                store::link_family(conn, cazyme_id, family_id)?;

                let primary = store::genbank_id(conn, &row.genbank.primary)?;
                store::link_genbank(conn, cazyme_id, primary, true)?;
                for synonym in &row.genbank.synonyms {
                    let genbank_id = store::genbank_id(conn, synonym)?;
                    store::link_genbank(conn, cazyme_id, genbank_id, false)?;
                }

                for ec in row.known_ec_numbers() {
                    let ec_id = store::ec_id(conn, ec)?;
                    store::link_ec(conn, cazyme_id, ec_id)?;
                }

                for (index, accession) in row.uniprot.iter().enumerate() {
                    let uniprot_id = store::uniprot_id(conn, accession, index == 0)?;
                    store::link_uniprot(conn, cazyme_id, uniprot_id)?;
                }

                for (index, accession) in row.pdb.iter().enumerate() {
                    let pdb_id = store::pdb_id(conn, accession, index == 0)?;
                    store::link_pdb(conn, cazyme_id, pdb_id)?;
                }

                let merged = Merged {
                    cazyme_id,
                    name: row.name.clone(),
                    taxonomy_id,
                    family_id,
                };
                Ok((merged, created))
            })
            .map_err(|source| IngestError::Database {
                name: row.name.clone(),
                url: page_url.to_string(),
                position: row.position,
                source,
            })?;

        let (merged, created) = merged;
        let cazyme_id = merged.cazyme_id;
        self.seen.entry(family.clone()).or_default().insert(key, merged);

        if created {
            debug!("Added {} ({}) as CAZyme {}", row.name, family, cazyme_id);
            Ok(MergeOutcome::Created(cazyme_id))
        } else {
            Ok(MergeOutcome::Extended(cazyme_id))
        }
    }
}
