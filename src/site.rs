// Current site session

use serde::{Deserialize, Serialize};
use url::Url;

/// Snapshot of the site the user is logged into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteContext {
    pub id: String,
    /// Base URL of the site, e.g. `https://school.test/moodle`
    pub url: String,
    pub user_id: u64,
    /// Site allows files to be downloaded to the device
    pub can_download_files: bool,
    /// Site disabled offline use of H5P packages
    pub h5p_offline_disabled: bool,
    /// Site exposes the xAPI statement web service
    pub can_post_statements: bool,
    /// Site exposes the web service listing every user's attempts
    pub can_get_users_attempts: bool,
}

impl SiteContext {
    /// Site with every feature enabled
    pub fn new(id: impl Into<String>, url: impl Into<String>, user_id: u64) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            user_id,
            can_download_files: true,
            h5p_offline_disabled: false,
            can_post_statements: true,
            can_get_users_attempts: true,
        }
    }

    /// Whether H5P packages can be stored on the device for this site
    pub fn can_download_packages(&self) -> bool {
        self.can_download_files && !self.h5p_offline_disabled
    }

    /// Whether `url` points inside this site.
    ///
    /// Scheme and a leading `www.` are ignored; host and explicit port must
    /// match and the path must be under the site path.
    pub fn contains_url(&self, url: &str) -> bool {
        let (Ok(site), Ok(target)) = (Url::parse(&self.url), Url::parse(url)) else {
            return false;
        };

        let (Some(site_host), Some(target_host)) = (site.host_str(), target.host_str()) else {
            return false;
        };

        if strip_www(site_host) != strip_www(target_host) || site.port() != target.port() {
            return false;
        }

        let site_path = site.path().trim_end_matches('/');
        let target_path = target.path();

        target_path == site_path
            || target_path
                .strip_prefix(site_path)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Join a path to the site URL
    pub fn join_path(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_url() {
        let site = SiteContext::new("s1", "https://school.test/moodle/", 2);

        assert!(site.contains_url("https://school.test/moodle/xapi/activity/5"));
        assert!(site.contains_url("http://www.school.test/moodle/xapi/activity/5"));
        assert!(!site.contains_url("https://school.test/moodle2/xapi/activity/5"));
        assert!(!site.contains_url("https://evil.test/moodle/xapi/activity/5"));
        assert!(!site.contains_url("https://school.test.evil.test/moodle/xapi/activity/5"));
        assert!(!site.contains_url("https://school.test:8443/moodle/xapi/activity/5"));
        assert!(!site.contains_url("not a url"));
    }

    #[test]
    fn test_root_site_contains_any_path() {
        let site = SiteContext::new("s1", "https://school.test", 2);
        assert!(site.contains_url("https://school.test/xapi/activity/5"));
    }

    #[test]
    fn test_download_capability() {
        let mut site = SiteContext::new("s1", "https://school.test", 2);
        assert!(site.can_download_packages());

        site.h5p_offline_disabled = true;
        assert!(!site.can_download_packages());
    }

    #[test]
    fn test_join_path() {
        let site = SiteContext::new("s1", "https://school.test/", 2);
        assert_eq!(site.join_path("/h5p/embed.php"), "https://school.test/h5p/embed.php");
    }
}
