//! Local page library.
//!
//! [`Archiving`] saves every page it fetches under a directory, one file per
//! URL. [`FileTransport`] serves a crawl from such a directory, so pages can
//! be downloaded once and parsed into a database later.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cazy::fetcher::{FetchError, Transport};
use crate::cazy::pages::relative_href;

/// File name of a page in the library. Pagination windows keep their offset:
/// `GH1_all.html?debut_PRINC=1000#pagination_PRINC` becomes
/// `GH1_all_debut_PRINC-1000.html`.
pub fn page_file_name(home: &str, url: &str) -> String {
    let relative = relative_href(url, home);
    let relative = relative.split('#').next().unwrap_or_default();
    let (path, query) = match relative.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (relative, None),
    };

    let name = if path.is_empty() { "index.html".to_string() } else { path.replace('/', "_") };
    match query {
        Some(query) if !query.is_empty() => {
            let stem = name.strip_suffix(".html").unwrap_or(&name);
            format!("{}_{}.html", stem, query.replace(['=', '&'], "-"))
        }
        _ => name,
    }
}

#[derive(Debug, Clone)]
pub struct PageLibrary {
    dir: PathBuf,
    home: String,
}

impl PageLibrary {
    pub fn new(dir: impl Into<PathBuf>, home: impl Into<String>) -> Self {
        PageLibrary { dir: dir.into(), home: home.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, url: &str) -> PathBuf {
        self.dir.join(page_file_name(&self.home, url))
    }

    pub fn save(&self, url: &str, body: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(url);
        fs::write(&path, body)?;
        Ok(path)
    }
}

/// Reads pages from a library instead of the network.
#[derive(Debug, Clone)]
pub struct FileTransport {
    library: PageLibrary,
}

impl FileTransport {
    pub fn new(library: PageLibrary) -> Self {
        FileTransport { library }
    }
}

impl Transport for FileTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let path = self.library.path(url);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FetchError::NotArchived {
                url: url.to_string(),
                path: path.display().to_string(),
            },
            _ => FetchError::Transport { url: url.to_string(), message: e.to_string() },
        })
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// Fetches through `inner` and saves each page body to the library.
pub struct Archiving<T: Transport> {
    inner: T,
    library: PageLibrary,
}

impl<T: Transport> Archiving<T> {
    pub fn new(inner: T, library: PageLibrary) -> Self {
        Archiving { inner, library }
    }
}

impl<T: Transport> Transport for Archiving<T> {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let body = self.inner.get(url)?;
        let path = self.library.save(url, &body).map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: format!("could not save page: {}", e),
        })?;
        debug!(url, path = %path.display(), "Saved page");
        Ok(body)
    }

    fn is_local(&self) -> bool {
        self.inner.is_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: &str = "http://www.cazy.org";

    struct Fixed;

    impl Transport for Fixed {
        fn get(&self, url: &str) -> Result<String, FetchError> {
            Ok(format!("<html>{}</html>", url))
        }
    }

    #[test]
    fn file_names_follow_the_url() {
        assert_eq!(page_file_name(HOME, "http://www.cazy.org"), "index.html");
        assert_eq!(page_file_name(HOME, "http://www.cazy.org/Glycoside-Hydrolases.html"), "Glycoside-Hydrolases.html");
        assert_eq!(
            page_file_name(HOME, "http://www.cazy.org/GH1_all.html?debut_PRINC=1000#pagination_PRINC"),
            "GH1_all_debut_PRINC-1000.html"
        );
        assert_eq!(page_file_name(HOME, "http://www.cazy.org/GH5_1_bacteria.html#top"), "GH5_1_bacteria.html");
    }

    #[test]
    fn archived_pages_are_served_back() {
        let dir = tempfile::tempdir().unwrap();
        let library = PageLibrary::new(dir.path().join("pages"), HOME);
        let url = "http://www.cazy.org/GH1_all.html?debut_PRINC=1000#pagination_PRINC";

        let fetched = Archiving::new(Fixed, library.clone()).get(url).unwrap();
        assert!(library.path(url).exists());

        let local = FileTransport::new(library);
        assert!(local.is_local());
        assert_eq!(local.get(url).unwrap(), fetched);
    }

    #[test]
    fn missing_page_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let local = FileTransport::new(PageLibrary::new(dir.path(), HOME));
        let err = local.get("http://www.cazy.org/GH9_all.html").unwrap_err();
        assert!(matches!(err, FetchError::NotArchived { .. }));
        assert!(!crate::cazy::fetcher::is_transient(&err));
    }
}
