//! Constants module for the AnimeFlow API
//!
//! Contains backend endpoint builders and catalog defaults.

/// URL builder functions for the remote document backends
pub mod endpoints {
    /// GitHub contents API URL for a file in a repository
    pub fn github_contents(api_base: &str, owner: &str, repo: &str, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            api_base.trim_end_matches('/'),
            owner,
            repo,
            path.trim_start_matches('/')
        )
    }

    /// JSONBin URL for the latest version of a bin
    pub fn jsonbin_latest(api_base: &str, bin_id: &str) -> String {
        format!("{}/b/{}/latest", api_base.trim_end_matches('/'), bin_id)
    }

    /// JSONBin URL used to update a bin
    pub fn jsonbin_bin(api_base: &str, bin_id: &str) -> String {
        format!("{}/b/{}", api_base.trim_end_matches('/'), bin_id)
    }
}

/// Defaults for backend configuration
pub mod defaults {
    pub const GITHUB_API_BASE: &str = "https://api.github.com";
    pub const GITHUB_BRANCH: &str = "main";
    pub const JSONBIN_API_BASE: &str = "https://api.jsonbin.io/v3";
    pub const DOCUMENT_PATH: &str = "database.json";
    pub const SYNC_INTERVAL_SECS: u64 = 300;
    pub const HTTP_TIMEOUT_SECS: u64 = 30;
    pub const PUBLIC_HOST: &str = "localhost";
}

/// Catalog limits and defaults
pub mod catalog {
    /// Version stamped into the document settings on every save
    pub const DOCUMENT_VERSION: &str = "1.0.0";

    pub const TRENDING_LIMIT: usize = 10;
    pub const RECENT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 100;

    pub const MAX_COMMENT_LENGTH: usize = 2000;
    pub const MIN_USERNAME_LENGTH: usize = 3;
    pub const MAX_USERNAME_LENGTH: usize = 32;
    pub const MIN_PASSWORD_LENGTH: usize = 6;

    /// Hosts whose pages are embedded as-is
    pub const PASSTHROUGH_HOSTS: &[&str] = &["terabox.com", "anichin.click", "anichin.group"];

    /// Generated avatar for users without a profile picture
    pub fn placeholder_avatar(username: &str) -> String {
        format!(
            "https://ui-avatars.com/api/?name={}&background=random",
            urlencoding::encode(username)
        )
    }
}

/// Relevance weights for ranked search
pub mod relevance {
    pub const TITLE_MATCH: f64 = 100.0;
    pub const TITLE_EXACT: f64 = 50.0;
    pub const TITLE_PREFIX: f64 = 25.0;
    pub const GENRE_MATCH: f64 = 50.0;
    pub const DESCRIPTION_MATCH: f64 = 25.0;
    pub const PER_EPISODE: f64 = 0.5;
    pub const MAX_EPISODE_BONUS: f64 = 10.0;
}
