// H5P display options and the online player URL

use serde::{Deserialize, Serialize};
use url::Url;

use crate::site::SiteContext;

const DISABLE_FRAME: u32 = 1;
const DISABLE_DOWNLOAD: u32 = 2;
const DISABLE_EMBED: u32 = 4;
const DISABLE_COPYRIGHT: u32 = 8;
const DISABLE_ABOUT: u32 = 16;

/// Buttons and decorations shown around a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub frame: bool,
    pub export: bool,
    pub embed: bool,
    pub copyright: bool,
    pub icon: bool,
}

impl DisplayOptions {
    /// Decode the "disabled options" bitmask stored in the activity.
    ///
    /// Export and embed are never offered inside the app.
    pub fn decode(disabled: u32) -> Self {
        let enabled = |flag: u32| disabled & flag == 0;

        Self {
            frame: enabled(DISABLE_FRAME),
            export: false,
            embed: false,
            copyright: enabled(DISABLE_COPYRIGHT),
            icon: enabled(DISABLE_ABOUT),
        }
    }

    /// Bitmask equivalent of these options
    pub fn encode(&self) -> u32 {
        let mut disabled = 0;
        if !self.frame {
            disabled |= DISABLE_FRAME;
        }
        if !self.export {
            disabled |= DISABLE_DOWNLOAD;
        }
        if !self.embed {
            disabled |= DISABLE_EMBED;
        }
        if !self.copyright {
            disabled |= DISABLE_COPYRIGHT;
        }
        if !self.icon {
            disabled |= DISABLE_ABOUT;
        }
        disabled
    }

    fn url_params(&self) -> [(&'static str, &'static str); 4] {
        let flag = |value: bool| if value { "1" } else { "0" };
        [
            ("frame", flag(self.frame)),
            ("export", flag(self.export)),
            ("embed", flag(self.embed)),
            ("copyright", flag(self.copyright)),
        ]
    }
}

/// URL of the site's embed page playing `file_url`.
///
/// Returns `None` when the site URL cannot be parsed.
pub fn online_player_url(
    site: &SiteContext,
    file_url: &str,
    options: Option<&DisplayOptions>,
    component: Option<&str>,
) -> Option<String> {
    let mut url = match Url::parse(&site.join_path("h5p/embed.php")) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Cannot build player URL for site {}: {}", site.url, e);
            return None;
        }
    };

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("url", file_url);
        if let Some(options) = options {
            for (name, value) in options.url_params() {
                query.append_pair(name, value);
            }
        }
        if let Some(component) = component.filter(|c| !c.is_empty()) {
            query.append_pair("component", component);
        }
    }

    Some(url.into())
}
