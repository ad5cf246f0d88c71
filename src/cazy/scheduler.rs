//! Crawl scheduler.
//!
//! Each class is a [`ClassUnit`] on a FIFO work queue. A unit starts out
//! pending, becomes discovered once its family index has been read, and is
//! re-queued at the tail for as long as any of its families still has
//! listing pages to retry. Class and family retries are counted separately
//! and share the same ceiling of `retries + 1` passes.
//!
//! Pagination windows of one family may be fetched by a small worker pool.
//! Parsed pages come back to the scheduler thread, which is the only writer
//! to the store.

use std::collections::{BTreeMap, VecDeque};
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use diesel::SqliteConnection;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cazy::config::CrawlConfig;
use crate::cazy::constants;
use crate::cazy::failures::FailureLog;
use crate::cazy::fetcher::{CancelToken, FetchError, Fetcher, RateLimiter, RetryPolicy, Transport};
use crate::cazy::ingest::{Ingestor, MergeOutcome};
use crate::cazy::listing::{listing_url, pagination_windows, ListingPage};
use crate::cazy::pages::{parse_class_index, parse_family_index, ClassLink, FamilyLink, ParseError};
use crate::cazy::record::{FamilyName, Kingdom};
use crate::cazy::store;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Cannot read the CAZy class index: {0}")]
    ClassIndexFetch(#[from] FetchError),

    #[error("Cannot read the CAZy class index: {0}")]
    ClassIndexLayout(#[from] ParseError),

    #[error("Failed to start page workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Totals of one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub classes: usize,
    pub families: usize,
    pub pages: usize,
    pub rows: usize,
    pub filtered: usize,
    pub added: usize,
    pub extended: usize,
    pub row_errors: usize,
    pub store_errors: usize,
    pub deleted_families: usize,
    pub abandoned_classes: Vec<String>,
    pub abandoned_families: Vec<String>,
    pub cancelled: bool,
}

/// One listing page still to be read. A first page also yields the
/// pagination windows of its listing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    url: String,
    kingdom: Option<Kingdom>,
    first: bool,
}

#[derive(Debug, Clone, Default)]
struct FamilyRetry {
    tries: u32,
    pending: Vec<Target>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassState {
    Pending,
    FamiliesDiscovered,
}

#[derive(Debug, Clone)]
struct ClassUnit {
    link: ClassLink,
    state: ClassState,
    tries: u32,
    failed: BTreeMap<FamilyLink, FamilyRetry>,
}

impl ClassUnit {
    fn new(link: ClassLink) -> Self {
        ClassUnit {
            link,
            state: ClassState::Pending,
            tries: 0,
            failed: BTreeMap::new(),
        }
    }
}

enum ClassFailure {
    Fetch(FetchError),
    Layout(ParseError),
}

pub struct Crawler<T: Transport> {
    config: CrawlConfig,
    fetcher: Fetcher<T>,
    limiter: Arc<RateLimiter>,
    pool: ThreadPool,
    ingestor: Ingestor,
}

impl<T: Transport> Crawler<T> {
    pub fn new(config: CrawlConfig, transport: T) -> Result<Self, CrawlError> {
        let limiter = if config.is_large_download() && !transport.is_local() {
            info!(
                interval_ms = constants::THROTTLED_INTERVAL_MS,
                "Large download requested, throttling requests"
            );
            RateLimiter::every(Duration::from_millis(constants::THROTTLED_INTERVAL_MS))
        } else {
            RateLimiter::unlimited()
        };
        let limiter = Arc::new(limiter);

        let fetcher = Fetcher::new(
            transport,
            RetryPolicy::new(config.retries),
            Arc::clone(&limiter),
            CancelToken::new(),
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.page_workers)
            .thread_name(|i| format!("cazy-page-{}", i))
            .build()?;

        Ok(Crawler {
            config,
            fetcher,
            limiter,
            pool,
            ingestor: Ingestor::new(),
        })
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn is_throttled(&self) -> bool {
        self.limiter.is_limited()
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// Cancelling stops the crawl before its next page fetch.
    pub fn cancel_token(&self) -> CancelToken {
        self.fetcher.cancel_token().clone()
    }

    fn max_attempts(&self) -> u32 {
        self.fetcher.policy().max_attempts
    }

    fn is_cancelled(&self) -> bool {
        self.fetcher.cancel_token().is_cancelled()
    }

    /// Crawls every class in scope until the work queue drains. Only an
    /// unreadable class index fails the run; other failures are logged and
    /// reported.
    pub fn run(
        &mut self,
        connection: &mut SqliteConnection,
        failures: &mut FailureLog,
    ) -> Result<CrawlReport, CrawlError> {
        let mut report = CrawlReport::default();

        let home = self.fetcher.fetch(&self.config.home_url)?;
        let classes = parse_class_index(&home, &self.config.home_url, &self.config.scope.excluded)?;

        let mut queue: VecDeque<ClassUnit> = classes
            .into_iter()
            .filter(|class| self.config.scope.includes_class(class.code))
            .map(ClassUnit::new)
            .collect();
        info!(classes = queue.len(), "Starting crawl");

        while let Some(unit) = queue.pop_front() {
            if self.is_cancelled() {
                warn!(remaining = queue.len() + 1, "Crawl cancelled");
                report.cancelled = true;
                break;
            }
            if let Some(unit) = self.visit_class(unit, connection, failures, &mut report) {
                queue.push_back(unit);
            }
        }

        info!(
            classes = report.classes,
            families = report.families,
            added = report.added,
            abandoned_classes = report.abandoned_classes.len(),
            abandoned_families = report.abandoned_families.len(),
            "Crawl finished"
        );
        Ok(report)
    }

    /// One scheduler pass over a class. Returns the unit when it must be
    /// re-queued.
    fn visit_class(
        &mut self,
        mut unit: ClassUnit,
        connection: &mut SqliteConnection,
        failures: &mut FailureLog,
        report: &mut CrawlReport,
    ) -> Option<ClassUnit> {
        match unit.state {
            ClassState::Pending => {
                unit.tries += 1;
                let families = match self.discover_families(&unit.link, connection, failures, report) {
                    Ok(families) => families,
                    Err(failure) => return self.class_failed(unit, failure, failures, report),
                };

                unit.state = ClassState::FamiliesDiscovered;
                report.classes += 1;
                report.families += families.len();

                for family in families {
                    let retry = FamilyRetry {
                        tries: 0,
                        pending: self.initial_targets(&family.name),
                    };
                    self.attempt_family(&mut unit, family, retry, connection, failures, report);
                }
            }
            ClassState::FamiliesDiscovered => {
                for (family, retry) in mem::take(&mut unit.failed) {
                    self.attempt_family(&mut unit, family, retry, connection, failures, report);
                }
            }
        }

        if unit.failed.is_empty() {
            debug!(class = %unit.link.code, "Class complete");
            None
        } else {
            Some(unit)
        }
    }

    fn class_failed(
        &self,
        unit: ClassUnit,
        failure: ClassFailure,
        failures: &mut FailureLog,
        report: &mut CrawlReport,
    ) -> Option<ClassUnit> {
        let class = unit.link.code;
        match failure {
            ClassFailure::Fetch(FetchError::Cancelled { .. }) => Some(unit),
            ClassFailure::Fetch(error) if unit.tries < self.max_attempts() => {
                warn!(%class, attempt = unit.tries, %error, "Could not read family index, re-queueing class");
                Some(unit)
            }
            ClassFailure::Fetch(error) => {
                failures.connection(format!(
                    "{}\t{}\tclass abandoned after {} attempts: {}",
                    class, unit.link.url, unit.tries, error
                ));
                report.abandoned_classes.push(class.to_string());
                None
            }
            // a layout change will not fix itself on retry
            ClassFailure::Layout(error) => {
                failures.format(error.to_string());
                report.abandoned_classes.push(class.to_string());
                None
            }
        }
    }

    fn discover_families(
        &self,
        class: &ClassLink,
        connection: &mut SqliteConnection,
        failures: &mut FailureLog,
        report: &mut CrawlReport,
    ) -> Result<Vec<FamilyLink>, ClassFailure> {
        let subfamilies = self.config.subfamilies;
        let page = self.fetcher.fetch(&class.url).map_err(ClassFailure::Fetch)?;
        let listed = parse_family_index(&page, &self.config.home_url, class.code, subfamilies)
            .map_err(ClassFailure::Layout)?;

        let names: Vec<FamilyName> = listed.iter().map(|family| family.name.clone()).collect();
        match store::mark_deleted_families(connection, class.code, &names, subfamilies) {
            Ok(marked) => report.deleted_families += marked,
            Err(e) => failures.persistence(format!("Could not mark deleted {} families: {}", class.code, e)),
        }

        if let Some(Some(requested)) = self.config.scope.classes.get(&class.code) {
            for name in requested.iter().filter(|name| !names.iter().any(|n| n.listing_name() == name.as_str())) {
                warn!(class = %class.code, family = %name, "Requested family is not listed on the class page");
            }
        }

        let selected: Vec<FamilyLink> = listed
            .into_iter()
            .filter(|family| {
                self.config
                    .scope
                    .includes_family(class.code, family.name.listing_name(), subfamilies)
            })
            .collect();

        info!(class = %class.code, listed = names.len(), selected = selected.len(), "Discovered families");
        Ok(selected)
    }

    /// The all-kingdom listing, or one listing per configured kingdom.
    fn initial_targets(&self, family: &FamilyName) -> Vec<Target> {
        let home = &self.config.home_url;
        let kingdoms = &self.config.filters.kingdoms;

        if kingdoms.is_empty() {
            return vec![Target { url: listing_url(home, family, None), kingdom: None, first: true }];
        }

        kingdoms
            .iter()
            .map(|kingdom| Target {
                url: listing_url(home, family, Some(*kingdom)),
                kingdom: Some(*kingdom),
                first: true,
            })
            .collect()
    }

    fn attempt_family(
        &mut self,
        unit: &mut ClassUnit,
        family: FamilyLink,
        mut retry: FamilyRetry,
        connection: &mut SqliteConnection,
        failures: &mut FailureLog,
        report: &mut CrawlReport,
    ) {
        retry.tries += 1;
        let targets = mem::take(&mut retry.pending);
        let failed = self.crawl_family(&family, targets, connection, failures, report);

        let Some((_, last_error)) = failed.last() else {
            self.ingestor.finish_family(&family.name);
            return;
        };
        let last_error = last_error.to_string();
        retry.pending = failed.into_iter().map(|(target, _)| target).collect();

        if self.is_cancelled() {
            unit.failed.insert(family, retry);
            return;
        }

        if retry.tries < self.max_attempts() {
            warn!(
                family = %family.name,
                attempt = retry.tries,
                pages = retry.pending.len(),
                "Family listing incomplete, will retry"
            );
            unit.failed.insert(family, retry);
        } else {
            failures.connection(format!(
                "{}\t{}\tfamily abandoned after {} attempts, {} pages not retrieved: {}",
                family.name,
                family.class,
                retry.tries,
                retry.pending.len(),
                last_error
            ));
            report.abandoned_families.push(family.name.to_string());
            self.ingestor.finish_family(&family.name);
        }
    }

    /// Reads the given listing pages and merges their rows. Returns the pages
    /// that could not be fetched.
    fn crawl_family(
        &mut self,
        family: &FamilyLink,
        targets: Vec<Target>,
        connection: &mut SqliteConnection,
        failures: &mut FailureLog,
        report: &mut CrawlReport,
    ) -> Vec<(Target, FetchError)> {
        let mut failed = Vec::new();
        let mut windows = Vec::new();

        for target in targets {
            if !target.first {
                windows.push(target);
                continue;
            }

            let page = match self.fetcher.fetch(&target.url) {
                Ok(page) => page,
                Err(error) => {
                    failed.push((target, error));
                    continue;
                }
            };

            match pagination_windows(&page) {
                Ok(urls) => windows.extend(urls.into_iter().skip(1).map(|url| Target {
                    url,
                    kingdom: target.kingdom,
                    first: false,
                })),
                Err(error) => failures.format(error.to_string()),
            }

            report.pages += 1;
            let parsed = ListingPage::parse(&page, target.kingdom);
            self.ingest_page(family, parsed, connection, failures, report);
        }

        debug!(family = %family.name, windows = windows.len(), "Fetching pagination windows");

        for chunk in windows.chunks(self.config.page_workers) {
            let fetcher = &self.fetcher;
            let fetched: Vec<(Target, Result<Result<ListingPage, ParseError>, FetchError>)> = self.pool.install(|| {
                chunk
                    .par_iter()
                    .map(|target| {
                        let parsed = fetcher
                            .fetch(&target.url)
                            .map(|page| ListingPage::parse(&page, target.kingdom));
                        (target.clone(), parsed)
                    })
                    .collect()
            });

            for (target, result) in fetched {
                match result {
                    Ok(parsed) => {
                        report.pages += 1;
                        self.ingest_page(family, parsed, connection, failures, report);
                    }
                    Err(error) => failed.push((target, error)),
                }
            }
        }

        failed
    }

    fn ingest_page(
        &mut self,
        family: &FamilyLink,
        parsed: Result<ListingPage, ParseError>,
        connection: &mut SqliteConnection,
        failures: &mut FailureLog,
        report: &mut CrawlReport,
    ) {
        let page = match parsed {
            Ok(page) => page,
            Err(error) => {
                failures.format(error.to_string());
                return;
            }
        };
        for error in page.layout_errors() {
            failures.format(error.to_string());
        }

        let url = page.url().to_string();
        for row in page.into_rows() {
            report.rows += 1;

            let row = match row {
                Ok(row) => row,
                Err(error) => {
                    report.row_errors += 1;
                    failures.format(error.to_string());
                    continue;
                }
            };

            if !self.config.filters.accepts(&row) {
                report.filtered += 1;
                continue;
            }

            match self.ingestor.merge(connection, &family.name, family.class, &url, &row) {
                Ok(MergeOutcome::Created(_)) => report.added += 1,
                Ok(MergeOutcome::Extended(_)) => report.extended += 1,
                Err(error) => {
                    report.store_errors += 1;
                    failures.persistence(error.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cazy::config::Settings;

    struct Offline;

    impl Transport for Offline {
        fn get(&self, url: &str) -> Result<String, FetchError> {
            Err(FetchError::Transport { url: url.to_string(), message: "offline".to_string() })
        }
    }

    fn crawler(kingdoms: &[&str], families: &[&str]) -> Crawler<Offline> {
        let mut settings = Settings {
            database_url: Some(":memory:".to_string()),
            ..Default::default()
        };
        settings.filters.kingdoms = kingdoms.iter().map(|k| k.to_string()).collect();
        settings.scope.families = families.iter().map(|f| f.to_string()).collect();
        Crawler::new(CrawlConfig::from_settings(settings).unwrap(), Offline).unwrap()
    }

    #[test]
    fn kingdom_filters_select_per_kingdom_listings() {
        let gh1 = FamilyName::parse("GH1").unwrap();

        let all = crawler(&[], &["GH1"]).initial_targets(&gh1);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].url, "http://www.cazy.org/GH1_all.html");
        assert_eq!(all[0].kingdom, None);

        let split = crawler(&["viruses", "archaea"], &["GH1"]).initial_targets(&gh1);
        let urls: Vec<&str> = split.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["http://www.cazy.org/GH1_archaea.html", "http://www.cazy.org/GH1_viruses.html"]);
        assert!(split.iter().all(|t| t.first));
    }

    #[test]
    fn large_requests_are_throttled() {
        assert!(!crawler(&[], &["GH1"]).is_throttled());
        assert!(crawler(&[], &[]).is_throttled());
    }

    #[test]
    fn unreachable_home_page_fails_the_run() {
        let mut settings = Settings {
            database_url: Some(":memory:".to_string()),
            ..Default::default()
        };
        settings.crawl.retries = 1;
        settings.scope.families = vec!["GH1".to_string()];
        let mut crawler = Crawler::new(CrawlConfig::from_settings(settings).unwrap(), Offline).unwrap();

        let mut conn = store::establish_connection(":memory:").unwrap();
        let mut failures = FailureLog::in_memory();
        let err = crawler.run(&mut conn, &mut failures).unwrap_err();
        assert!(matches!(err, CrawlError::ClassIndexFetch(FetchError::FetchFailed { attempts: 2, .. })));
    }
}
