//! SQLite store: connection setup, embedded migrations and the
//! create-or-fetch helpers the merge engine is built from.
//!
//! Every helper takes the connection it should run on, so a caller can
//! group several of them inside one transaction.

use std::collections::HashSet;

use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};
use thiserror::Error;

use crate::cazy::models::*;
use crate::cazy::record::{ClassCode, FamilyName, Kingdom, Organism};
use crate::schema::*;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

diesel::define_sql_function!(fn last_insert_rowid() -> Integer);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Error connecting to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: ConnectionError,
    },

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Opens the database, enables foreign keys and applies pending migrations.
pub fn establish_connection(database_url: &str) -> Result<SqliteConnection, StoreError> {
    let path = database_url.strip_prefix("sqlite://").unwrap_or(database_url);
    let mut connection = SqliteConnection::establish(path).map_err(|source| StoreError::Connection {
        url: database_url.to_string(),
        source,
    })?;

    diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut connection)?;
    let applied = run_migrations(&mut connection)?;
    info!("Connected to {} ({} migrations applied)", database_url, applied);

    Ok(connection)
}

pub fn run_migrations(connection: &mut SqliteConnection) -> Result<usize, StoreError> {
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StoreError::Migration(e.to_string()))?;
    Ok(applied.len())
}

///////////////////////////////////////////////////////////////////////////////

pub fn kingdom_id(connection: &mut SqliteConnection, kingdom: Kingdom) -> QueryResult<i32> {
    diesel::insert_into(kingdoms::table)
        .values(&NewKingdom { kingdom: kingdom.as_ref() })
        .on_conflict(kingdoms::kingdom)
        .do_nothing()
        .execute(connection)?;

    kingdoms::table
        .filter(kingdoms::kingdom.eq(kingdom.as_ref()))
        .select(kingdoms::kingdom_id)
        .first(connection)
}

/// An existing (genus, species) pair keeps the kingdom it was first stored with.
pub fn taxonomy_id(connection: &mut SqliteConnection, organism: &Organism, kingdom_id: i32) -> QueryResult<i32> {
    diesel::insert_into(taxs::table)
        .values(&NewTaxonomy {
            genus: &organism.genus,
            species: &organism.species,
            kingdom_id,
        })
        .on_conflict((taxs::genus, taxs::species))
        .do_nothing()
        .execute(connection)?;

    taxs::table
        .filter(taxs::genus.eq(&organism.genus))
        .filter(taxs::species.eq(&organism.species))
        .select(taxs::taxonomy_id)
        .first(connection)
}

pub fn find_family(connection: &mut SqliteConnection, name: &FamilyName) -> QueryResult<Option<i32>> {
    let query = families::table
        .filter(families::family.eq(&name.family))
        .select(families::family_id)
        .into_boxed();

    let query = match &name.subfamily {
        Some(subfamily) => query.filter(families::subfamily.eq(subfamily)),
        None => query.filter(families::subfamily.is_null()),
    };

    query.first(connection).optional()
}

pub fn family_id(connection: &mut SqliteConnection, name: &FamilyName, class: ClassCode) -> QueryResult<i32> {
    if let Some(id) = find_family(connection, name)? {
        return Ok(id);
    }

    diesel::insert_into(families::table)
        .values(&NewFamily {
            family: &name.family,
            subfamily: name.subfamily.as_deref(),
            class_code: class.as_str(),
        })
        .execute(connection)?;
    debug!("Catalogued new family {}", name);

    diesel::select(last_insert_rowid()).get_result(connection)
}

pub fn insert_cazyme(connection: &mut SqliteConnection, name: &str, taxonomy_id: i32) -> QueryResult<i32> {
    diesel::insert_into(cazymes::table)
        .values(&NewCazyme { cazyme_name: name, taxonomy_id })
        .execute(connection)?;

    diesel::select(last_insert_rowid()).get_result(connection)
}

pub fn cazyme_exists(connection: &mut SqliteConnection, cazyme_id: i32) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(cazymes::table.filter(cazymes::cazyme_id.eq(cazyme_id))))
        .get_result(connection)
}

pub fn link_family(connection: &mut SqliteConnection, cazyme_id: i32, family_id: i32) -> QueryResult<usize> {
    diesel::insert_into(cazymes_families::table)
        .values(&CazymeFamily { cazyme_id, family_id })
        .on_conflict_do_nothing()
        .execute(connection)
}

pub fn genbank_id(connection: &mut SqliteConnection, accession: &str) -> QueryResult<i32> {
    diesel::insert_into(genbanks::table)
        .values(&NewGenbank { genbank_accession: accession })
        .on_conflict(genbanks::genbank_accession)
        .do_nothing()
        .execute(connection)?;

    genbanks::table
        .filter(genbanks::genbank_accession.eq(accession))
        .select(genbanks::genbank_id)
        .first(connection)
}

/// Links an accession to a CAZyme once. A CAZyme keeps at most one primary
/// link: a primary request for a CAZyme that already has one lands as
/// non-primary, and an existing non-primary link is promoted when the
/// CAZyme has no primary yet.
pub fn link_genbank(
    connection: &mut SqliteConnection,
    cazyme_id: i32,
    genbank_id: i32,
    primary: bool,
) -> QueryResult<()> {
    let existing: Option<GenbankLink> = cazymes_genbanks::table
        .filter(cazymes_genbanks::cazyme_id.eq(cazyme_id))
        .filter(cazymes_genbanks::genbank_id.eq(genbank_id))
        .select(GenbankLink::as_select())
        .first(connection)
        .optional()?;

    let has_primary = primary
        && cazymes_genbanks::table
            .filter(cazymes_genbanks::cazyme_id.eq(cazyme_id))
            .filter(cazymes_genbanks::is_primary.eq(true))
            .count()
            .get_result::<i64>(connection)?
            > 0;

    match existing {
        Some(link) if primary && !link.is_primary && !has_primary => {
            diesel::update(cazymes_genbanks::table.find(link.link_id))
                .set(cazymes_genbanks::is_primary.eq(true))
                .execute(connection)?;
        }
        Some(_) => {}
        None => {
            diesel::insert_into(cazymes_genbanks::table)
                .values(&NewGenbankLink {
                    cazyme_id,
                    genbank_id,
                    is_primary: primary && !has_primary,
                })
                .execute(connection)?;
        }
    }

    Ok(())
}

pub fn ec_id(connection: &mut SqliteConnection, ec_number: &str) -> QueryResult<i32> {
    diesel::insert_into(ecs::table)
        .values(&NewEc { ec_number })
        .on_conflict(ecs::ec_number)
        .do_nothing()
        .execute(connection)?;

    ecs::table
        .filter(ecs::ec_number.eq(ec_number))
        .select(ecs::ec_id)
        .first(connection)
}

pub fn link_ec(connection: &mut SqliteConnection, cazyme_id: i32, ec_id: i32) -> QueryResult<usize> {
    diesel::insert_into(cazymes_ecs::table)
        .values(&CazymeEc { cazyme_id, ec_id })
        .on_conflict_do_nothing()
        .execute(connection)
}

pub fn uniprot_id(connection: &mut SqliteConnection, accession: &str, is_primary: bool) -> QueryResult<i32> {
    diesel::insert_into(uniprots::table)
        .values(&NewUniprot { uniprot_accession: accession, is_primary })
        .on_conflict((uniprots::uniprot_accession, uniprots::is_primary))
        .do_nothing()
        .execute(connection)?;

    uniprots::table
        .filter(uniprots::uniprot_accession.eq(accession))
        .filter(uniprots::is_primary.eq(is_primary))
        .select(uniprots::uniprot_id)
        .first(connection)
}

pub fn link_uniprot(connection: &mut SqliteConnection, cazyme_id: i32, uniprot_id: i32) -> QueryResult<usize> {
    diesel::insert_into(cazymes_uniprots::table)
        .values(&CazymeUniprot { cazyme_id, uniprot_id })
        .on_conflict_do_nothing()
        .execute(connection)
}

pub fn pdb_id(connection: &mut SqliteConnection, accession: &str, is_primary: bool) -> QueryResult<i32> {
    diesel::insert_into(pdbs::table)
        .values(&NewPdb { pdb_accession: accession, is_primary })
        .on_conflict((pdbs::pdb_accession, pdbs::is_primary))
        .do_nothing()
        .execute(connection)?;

    pdbs::table
        .filter(pdbs::pdb_accession.eq(accession))
        .filter(pdbs::is_primary.eq(is_primary))
        .select(pdbs::pdb_id)
        .first(connection)
}

pub fn link_pdb(connection: &mut SqliteConnection, cazyme_id: i32, pdb_id: i32) -> QueryResult<usize> {
    diesel::insert_into(cazymes_pdbs::table)
        .values(&CazymePdb { cazyme_id, pdb_id })
        .on_conflict_do_nothing()
        .execute(connection)
}

///////////////////////////////////////////////////////////////////////////////

/// Records a marker for every catalogued family of `class` missing from the
/// class page. Catalogued subfamilies are only compared when the index was
/// read with subfamilies. Returns the number of new markers.
pub fn mark_deleted_families(
    connection: &mut SqliteConnection,
    class: ClassCode,
    listed: &[FamilyName],
    subfamilies: bool,
) -> QueryResult<usize> {
    let catalogued: Vec<Family> = families::table
        .filter(families::class_code.eq(class.as_str()))
        .select(Family::as_select())
        .load(connection)?;

    let listed: HashSet<(&str, Option<&str>)> = listed
        .iter()
        .map(|name| (name.family.as_str(), name.subfamily.as_deref()))
        .collect();

    let mut marked = 0;
    for family in catalogued {
        if family.subfamily.is_some() && !subfamilies {
            continue;
        }
        if listed.contains(&(family.family.as_str(), family.subfamily.as_deref())) {
            continue;
        }

        marked += diesel::insert_or_ignore_into(deleted_families::table)
            .values(&NewDeletedFamily {
                family: &family.family,
                subfamily: family.subfamily.as_deref(),
                class_code: &family.class_code,
            })
            .execute(connection)?;
    }

    if marked > 0 {
        info!("Marked {} {} families as deleted", marked, class);
    }
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> SqliteConnection {
        establish_connection(":memory:").unwrap()
    }

    fn organism(text: &str) -> Organism {
        Organism::parse(text).unwrap()
    }

    #[test]
    fn natural_keys_are_reused() {
        let mut conn = connection();
        let bacteria = kingdom_id(&mut conn, Kingdom::Bacteria).unwrap();
        assert_eq!(kingdom_id(&mut conn, Kingdom::Bacteria).unwrap(), bacteria);

        let foo_bar = taxonomy_id(&mut conn, &organism("Foo bar"), bacteria).unwrap();
        assert_eq!(taxonomy_id(&mut conn, &organism("Foo bar"), bacteria).unwrap(), foo_bar);
        assert_ne!(taxonomy_id(&mut conn, &organism("Foo baz"), bacteria).unwrap(), foo_bar);

        let gh = ClassCode::resolve("GH").unwrap();
        let gh5 = family_id(&mut conn, &FamilyName::parse("GH5").unwrap(), gh).unwrap();
        let gh5_1 = family_id(&mut conn, &FamilyName::parse("GH5_1").unwrap(), gh).unwrap();
        assert_ne!(gh5, gh5_1);
        assert_eq!(family_id(&mut conn, &FamilyName::parse("GH5").unwrap(), gh).unwrap(), gh5);
        assert_eq!(family_id(&mut conn, &FamilyName::parse("GH5_1").unwrap(), gh).unwrap(), gh5_1);

        let count: i64 = families::table.count().get_result(&mut conn).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn cazyme_keeps_a_single_primary_genbank() {
        let mut conn = connection();
        let kingdom = kingdom_id(&mut conn, Kingdom::Archaea).unwrap();
        let tax = taxonomy_id(&mut conn, &organism("Foo bar"), kingdom).unwrap();
        let first = insert_cazyme(&mut conn, "ProtA", tax).unwrap();
        let second = insert_cazyme(&mut conn, "ProtA", tax).unwrap();
        assert_ne!(first, second);
        assert!(cazyme_exists(&mut conn, second).unwrap());

        let abc = genbank_id(&mut conn, "ABC1.1").unwrap();
        let xyz = genbank_id(&mut conn, "XYZ2.1").unwrap();
        link_genbank(&mut conn, first, xyz, false).unwrap();
        link_genbank(&mut conn, first, abc, true).unwrap();
        link_genbank(&mut conn, first, abc, true).unwrap();
        link_genbank(&mut conn, first, xyz, true).unwrap();
        // the same accession may be primary for another CAZyme
        link_genbank(&mut conn, second, abc, true).unwrap();

        let links: Vec<GenbankLink> = cazymes_genbanks::table
            .select(GenbankLink::as_select())
            .order(cazymes_genbanks::link_id)
            .load(&mut conn)
            .unwrap();
        let flags: Vec<(i32, i32, bool)> = links.iter().map(|l| (l.cazyme_id, l.genbank_id, l.is_primary)).collect();
        assert_eq!(flags, vec![(first, xyz, false), (first, abc, true), (second, abc, true)]);
    }

    #[test]
    fn accession_links_are_not_duplicated() {
        let mut conn = connection();
        let kingdom = kingdom_id(&mut conn, Kingdom::Viruses).unwrap();
        let tax = taxonomy_id(&mut conn, &organism("Foo bar"), kingdom).unwrap();
        let cazyme = insert_cazyme(&mut conn, "ProtA", tax).unwrap();

        let primary = uniprot_id(&mut conn, "P12345", true).unwrap();
        let secondary = uniprot_id(&mut conn, "P12345", false).unwrap();
        assert_ne!(primary, secondary);
        assert_eq!(link_uniprot(&mut conn, cazyme, primary).unwrap(), 1);
        assert_eq!(link_uniprot(&mut conn, cazyme, primary).unwrap(), 0);

        let ec = ec_id(&mut conn, "3.2.1.4").unwrap();
        assert_eq!(ec_id(&mut conn, "3.2.1.4").unwrap(), ec);
        assert_eq!(link_ec(&mut conn, cazyme, ec).unwrap(), 1);
        assert_eq!(link_ec(&mut conn, cazyme, ec).unwrap(), 0);

        let pdb = pdb_id(&mut conn, "1CBG", true).unwrap();
        assert_eq!(link_pdb(&mut conn, cazyme, pdb).unwrap(), 1);
    }

    #[test]
    fn families_missing_from_the_index_are_marked_once() {
        let mut conn = connection();
        let gh = ClassCode::resolve("GH").unwrap();
        for name in ["GH1", "GH2", "GH5_1"] {
            family_id(&mut conn, &FamilyName::parse(name).unwrap(), gh).unwrap();
        }
        family_id(&mut conn, &FamilyName::parse("PL1").unwrap(), ClassCode::resolve("PL").unwrap()).unwrap();

        let listed = vec![FamilyName::parse("GH1").unwrap()];
        assert_eq!(mark_deleted_families(&mut conn, gh, &listed, false).unwrap(), 1);
        assert_eq!(mark_deleted_families(&mut conn, gh, &listed, false).unwrap(), 0);
        assert_eq!(mark_deleted_families(&mut conn, gh, &listed, true).unwrap(), 1);

        let marked: Vec<String> = deleted_families::table
            .select(deleted_families::family)
            .order(deleted_families::deleted_id)
            .load(&mut conn)
            .unwrap();
        assert_eq!(marked, vec!["GH2", "GH5"]);
        // catalogue rows are kept
        let count: i64 = families::table.count().get_result(&mut conn).unwrap();
        assert_eq!(count, 4);
    }
}
