use std::io;

use chrono::Local;
use clap::Parser;
use csv::{Writer, WriterBuilder};
use tracing::{error, info};

use crate::cazy::query::{cazymes, populated_families, Accession, CazymeRecord};
use crate::cazy::store::establish_connection;
use crate::commands::{init_logging, load_config, SelectionArgs};

const HEADER: [&str; 13] = [
    "cazyme_id",
    "name",
    "families",
    "kingdom",
    "genus",
    "species",
    "ec_numbers",
    "genbank_primary",
    "genbank_other",
    "uniprot_primary",
    "uniprot_other",
    "pdb_primary",
    "pdb_other",
];

#[derive(Parser, Debug, Clone)]
#[command(about = "Print stored CAZymes matching the selection as TSV")]
pub struct Args {
    #[command(flatten)]
    selection: SelectionArgs,

    // Only list the families that have CAZymes
    #[arg(long)]
    list_families: bool,
}

pub fn command(args: Args) {
    if let Err(e) = init_logging(args.selection.verbose, None, &Local::now()) {
        eprintln!("Cannot set up logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&args) {
        error!("Query failed: {}", e);
        std::process::exit(1);
    }
}

fn tsv_writer<W: io::Write>(out: W) -> Writer<W> {
    WriterBuilder::new().delimiter(b'\t').from_writer(out)
}

fn accessions(values: &[Accession], primary: bool) -> String {
    values
        .iter()
        .filter(|a| a.primary == primary)
        .map(|a| a.accession.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn tsv_record(record: &CazymeRecord) -> [String; 13] {
    let families: Vec<String> = record.families.iter().map(|(_, family)| family.to_string()).collect();
    let kingdom = record.kingdom.map(|k| k.to_string()).unwrap_or_default();

    [
        record.cazyme_id.to_string(),
        record.name.clone(),
        families.join(","),
        kingdom,
        record.genus.clone(),
        record.species.clone(),
        record.ec_numbers.join(","),
        accessions(&record.genbank, true),
        accessions(&record.genbank, false),
        accessions(&record.uniprot, true),
        accessions(&record.uniprot, false),
        accessions(&record.pdb, true),
        accessions(&record.pdb, false),
    ]
}

pub fn write_cazymes<W: io::Write>(records: &[CazymeRecord], out: W) -> csv::Result<()> {
    let mut wtr = tsv_writer(out);
    wtr.write_record(HEADER)?;
    for record in records {
        wtr.write_record(tsv_record(record))?;
    }
    wtr.flush()?;
    Ok(())
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args.selection, None)?;
    let mut connection = establish_connection(&config.database_url)?;

    if args.list_families {
        let mut wtr = tsv_writer(io::stdout().lock());
        wtr.write_record(["family"])?;
        for family in populated_families(&mut connection)? {
            wtr.write_record([family])?;
        }
        wtr.flush()?;
        return Ok(());
    }

    let records = cazymes(&mut connection, &config.scope, config.subfamilies, &config.filters)?;
    write_cazymes(&records, io::stdout().lock())?;

    info!("{} CAZymes selected", records.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cazy::record::{ClassCode, FamilyName, Kingdom};

    #[test]
    fn tsv_separates_primary_accessions() {
        let record = CazymeRecord {
            cazyme_id: 7,
            name: "ProtA".to_string(),
            genus: "Foo".to_string(),
            species: "bar".to_string(),
            kingdom: Some(Kingdom::Bacteria),
            families: vec![
                (ClassCode::resolve("GH").unwrap(), FamilyName::parse("GH5").unwrap()),
                (ClassCode::resolve("GH").unwrap(), FamilyName::parse("GH5_1").unwrap()),
            ],
            ec_numbers: vec!["3.2.1.4".to_string()],
            genbank: vec![
                Accession { accession: "ABC123.1".to_string(), primary: true },
                Accession { accession: "XYZ456.2".to_string(), primary: false },
            ],
            uniprot: vec![],
            pdb: vec![],
        };

        let mut out = Vec::new();
        write_cazymes(&[record], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("cazyme_id\tname\tfamilies\t"));
        assert_eq!(lines[0].split('\t').count(), 13);
        assert_eq!(lines[1], "7\tProtA\tGH5,GH5_1\tBacteria\tFoo\tbar\t3.2.1.4\tABC123.1\tXYZ456.2\t\t\t\t");
    }

    #[test]
    fn empty_selection_still_has_a_header() {
        let mut out = Vec::new();
        write_cazymes(&[], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }
}
