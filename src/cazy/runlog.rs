use chrono::{DateTime, Local};
use diesel::prelude::*;
use log::info;

use crate::cazy::config::CrawlConfig;
use crate::cazy::models::{NewRunLog, RunLog};
use crate::schema::logs;

pub const SCRAPE_METHOD: &str = "CAZy scrape";

fn joined<I, S>(values: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

/// Unrestricted axes are stored as NULL.
pub fn new_run_log(config: &CrawlConfig, date: &DateTime<Local>, method: &str) -> NewRunLog {
    let filters = &config.filters;
    NewRunLog {
        date: date.format("%Y-%m-%d %H:%M:%S").to_string(),
        method: method.to_string(),
        classes: joined(config.scope.class_names()),
        families: joined(config.scope.family_names()),
        genera: joined(&filters.genera),
        species: joined(&filters.species),
        strains: joined(&filters.strains),
        kingdoms: joined(&filters.kingdoms),
        ec_numbers: joined(&filters.ec_numbers),
    }
}

pub fn record_run(connection: &mut SqliteConnection, config: &CrawlConfig, date: &DateTime<Local>) -> QueryResult<()> {
    let entry = new_run_log(config, date, SCRAPE_METHOD);
    diesel::insert_into(logs::table).values(&entry).execute(connection)?;
    info!("Recorded run started at {}", entry.date);
    Ok(())
}

pub fn runs(connection: &mut SqliteConnection) -> QueryResult<Vec<RunLog>> {
    logs::table
        .select(RunLog::as_select())
        .order(logs::log_id)
        .load(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cazy::config::Settings;
    use crate::cazy::store;

    #[test]
    fn run_log_stores_effective_filters() {
        let mut settings = Settings {
            database_url: Some(":memory:".to_string()),
            ..Default::default()
        };
        settings.scope.classes = vec!["GH".to_string()];
        settings.scope.families = vec!["PL1,PL2".to_string()];
        settings.filters.kingdoms = vec!["bacteria".to_string()];
        let config = CrawlConfig::from_settings(settings).unwrap();

        let mut conn = store::establish_connection(":memory:").unwrap();
        record_run(&mut conn, &config, &Local::now()).unwrap();
        record_run(&mut conn, &config, &Local::now()).unwrap();

        let runs = runs(&mut conn).unwrap();
        assert_eq!(runs.len(), 2);
        let run = &runs[0];
        assert_eq!(run.method, "CAZy scrape");
        assert_eq!(run.classes.as_deref(), Some("GH"));
        assert_eq!(run.families.as_deref(), Some("PL1,PL2"));
        assert_eq!(run.kingdoms.as_deref(), Some("Bacteria"));
        assert_eq!(run.genera, None);
        assert_eq!(run.ec_numbers, None);
    }
}
