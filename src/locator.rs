use std::{
    fmt,
    path::{Path, PathBuf},
};

use url::Url;

/// A path or URI naming a content source: a plain local path, `file:`, a
/// transfer protocol such as `ftp:`, a platform `content:` handle, or `http(s):`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locator(String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme<'a> {
    Local,
    Transfer(&'a str),
    Content,
    Other(&'a str),
}

impl Locator {
    pub fn new(raw: impl Into<String>) -> Self {
        Locator(raw.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Locator(path.to_string_lossy().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URI scheme without the trailing colon. Single letters are drive
    /// prefixes, not schemes.
    pub fn protocol(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once(':')?;
        let mut chars = scheme.chars();
        let first = chars.next()?;
        if scheme.len() < 2 || !first.is_ascii_alphabetic() {
            return None;
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
            return None;
        }
        Some(scheme)
    }

    pub fn scheme(&self) -> Scheme<'_> {
        match self.protocol() {
            None => Scheme::Local,
            Some(p) if p.eq_ignore_ascii_case("file") => Scheme::Local,
            Some(p) if p.eq_ignore_ascii_case("ftp") || p.eq_ignore_ascii_case("sftp") => {
                Scheme::Transfer(p)
            }
            Some(p) if p.eq_ignore_ascii_case("content") => Scheme::Content,
            Some(p) => Scheme::Other(p),
        }
    }

    pub fn join(&self, rel: &str) -> Locator {
        let base = self.0.trim_end_matches('/');
        let rel = rel.trim_start_matches('/');
        Locator(format!("{base}/{rel}"))
    }

    /// Parent locator, keeping the trailing slash. `None` for a bare name.
    pub fn dirname(&self) -> Option<Locator> {
        let trimmed = self.0.trim_end_matches('/');
        let idx = trimmed.rfind('/')?;
        Some(Locator(trimmed[..=idx].to_string()))
    }

    pub fn basename(&self) -> &str {
        let path = self.path_part();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Lowercased extension of the last segment, without the dot.
    pub fn extname(&self) -> Option<String> {
        extname(self.basename())
    }

    /// Local filesystem path, for plain paths and `file:` URIs.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        match self.protocol() {
            None => Some(PathBuf::from(&self.0)),
            Some(p) if p.eq_ignore_ascii_case("file") => {
                Url::parse(&self.0).ok()?.to_file_path().ok()
            }
            Some(_) => None,
        }
    }

    fn path_part(&self) -> &str {
        let end = self.0.find(['?', '#']).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Locator::new(raw)
    }
}

pub fn extname(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    // dotfiles such as `.env` have no extension
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_schemes() {
        assert_eq!(Locator::from("/home/me/site/a.html").scheme(), Scheme::Local);
        assert_eq!(Locator::from("file:///home/me/a.html").scheme(), Scheme::Local);
        assert_eq!(
            Locator::from("sftp://host/www/a.png").scheme(),
            Scheme::Transfer("sftp")
        );
        assert_eq!(
            Locator::from("content://com.android/doc/12").scheme(),
            Scheme::Content
        );
        assert_eq!(
            Locator::from("https://example.com/x.css").scheme(),
            Scheme::Other("https")
        );
        assert_eq!(Locator::from("C:\\site\\a.html").scheme(), Scheme::Local);
    }

    #[test]
    fn join_and_dirname() {
        let base = Locator::from("ftp://host/www/");
        assert_eq!(base.join("img/a.png").as_str(), "ftp://host/www/img/a.png");
        assert_eq!(
            Locator::from("/srv/site").join("/index.html").as_str(),
            "/srv/site/index.html"
        );
        assert_eq!(
            Locator::from("file:///srv/site/index.html").dirname(),
            Some(Locator::from("file:///srv/site/"))
        );
        assert_eq!(Locator::from("index.html").dirname(), None);
    }

    #[test]
    fn extension_handling() {
        assert_eq!(Locator::from("/a/b/Index.HTML").extname().as_deref(), Some("html"));
        assert_eq!(Locator::from("https://h/a.js?v=2").extname().as_deref(), Some("js"));
        assert_eq!(extname(".env"), None);
        assert_eq!(extname("README"), None);
    }

    #[test]
    fn file_uris_map_to_paths() {
        assert_eq!(
            Locator::from("file:///srv/site/a.html").to_file_path(),
            Some(PathBuf::from("/srv/site/a.html"))
        );
        assert_eq!(Locator::from("https://h/a").to_file_path(), None);
    }
}
