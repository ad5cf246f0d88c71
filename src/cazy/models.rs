use diesel::prelude::*;

use crate::schema::*;

#[derive(Insertable)]
#[diesel(table_name = kingdoms)]
pub struct NewKingdom<'a> {
    pub kingdom: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = taxs)]
pub struct NewTaxonomy<'a> {
    pub genus: &'a str,
    pub species: &'a str,
    pub kingdom_id: i32,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = families)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Family {
    pub family_id: i32,
    pub family: String,
    pub subfamily: Option<String>,
    pub class_code: String,
}

#[derive(Insertable)]
#[diesel(table_name = families)]
pub struct NewFamily<'a> {
    pub family: &'a str,
    pub subfamily: Option<&'a str>,
    pub class_code: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = deleted_families)]
pub struct NewDeletedFamily<'a> {
    pub family: &'a str,
    pub subfamily: Option<&'a str>,
    pub class_code: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = cazymes)]
pub struct NewCazyme<'a> {
    pub cazyme_name: &'a str,
    pub taxonomy_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = cazymes_families)]
pub struct CazymeFamily {
    pub cazyme_id: i32,
    pub family_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = genbanks)]
pub struct NewGenbank<'a> {
    pub genbank_accession: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(table_name = cazymes_genbanks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GenbankLink {
    pub link_id: i32,
    pub cazyme_id: i32,
    pub genbank_id: i32,
    pub is_primary: bool,
}

#[derive(Insertable)]
#[diesel(table_name = cazymes_genbanks)]
pub struct NewGenbankLink {
    pub cazyme_id: i32,
    pub genbank_id: i32,
    pub is_primary: bool,
}

#[derive(Insertable)]
#[diesel(table_name = ecs)]
pub struct NewEc<'a> {
    pub ec_number: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = cazymes_ecs)]
pub struct CazymeEc {
    pub cazyme_id: i32,
    pub ec_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = uniprots)]
pub struct NewUniprot<'a> {
    pub uniprot_accession: &'a str,
    pub is_primary: bool,
}

#[derive(Insertable)]
#[diesel(table_name = cazymes_uniprots)]
pub struct CazymeUniprot {
    pub cazyme_id: i32,
    pub uniprot_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = pdbs)]
pub struct NewPdb<'a> {
    pub pdb_accession: &'a str,
    pub is_primary: bool,
}

#[derive(Insertable)]
#[diesel(table_name = cazymes_pdbs)]
pub struct CazymePdb {
    pub cazyme_id: i32,
    pub pdb_id: i32,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RunLog {
    pub log_id: i32,
    pub date: String,
    pub method: String,
    pub classes: Option<String>,
    pub families: Option<String>,
    pub genera: Option<String>,
    pub species: Option<String>,
    pub strains: Option<String>,
    pub kingdoms: Option<String>,
    pub ec_numbers: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = logs)]
pub struct NewRunLog {
    pub date: String,
    pub method: String,
    pub classes: Option<String>,
    pub families: Option<String>,
    pub genera: Option<String>,
    pub species: Option<String>,
    pub strains: Option<String>,
    pub kingdoms: Option<String>,
    pub ec_numbers: Option<String>,
}
