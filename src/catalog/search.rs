//! Ranked and catalog-wide search

use super::{find_anime, matches_query, Catalog, CatalogResult, SortKey, SortOrder};
use crate::constants::relevance::*;
use crate::models::{Anime, Comment, Episode, EpisodeMatch, SearchResults};

impl Catalog {
    /// Episodes of one anime whose title contains `query`, case-insensitively.
    /// A blank query matches nothing.
    pub async fn search_episodes(&self, anime_id: i64, query: &str) -> CatalogResult<Vec<Episode>> {
        let needle = query.trim().to_lowercase();
        self.read(|doc| {
            let anime = find_anime(doc, anime_id)?;
            if needle.is_empty() {
                return Ok(Vec::new());
            }
            Ok(anime
                .episodes
                .iter()
                .filter(|e| episode_matches(e, &needle))
                .cloned()
                .collect())
        })
        .await
    }

    /// Anime (ranked by relevance), episodes and comments matching `query`
    pub async fn global_search(&self, query: &str) -> SearchResults {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return SearchResults::default();
        }

        let mut results = self
            .read(|doc| {
                let anime: Vec<Anime> = doc
                    .anime
                    .iter()
                    .filter(|a| matches_query(a, &needle))
                    .cloned()
                    .collect();

                let episodes = doc
                    .anime
                    .iter()
                    .flat_map(|anime| {
                        anime
                            .episodes
                            .iter()
                            .filter(|e| episode_matches(e, &needle))
                            .map(|episode| EpisodeMatch {
                                episode: episode.clone(),
                                anime_id: anime.id,
                                anime_title: anime.title.clone(),
                            })
                    })
                    .collect();

                let mut comments = Vec::new();
                collect_comments(&doc.comments, &needle, &mut comments);

                SearchResults {
                    anime,
                    episodes,
                    comments,
                }
            })
            .await;

        super::sort_by_key(&mut results.anime, SortKey::Relevance, SortOrder::Desc, &needle);
        results
    }
}

/// Score used to rank search hits. `needle` is lowercased; when empty only
/// rating and episode count contribute.
pub(crate) fn relevance_score(anime: &Anime, needle: &str) -> f64 {
    let mut score = 0.0;
    if !needle.is_empty() {
        let title = anime.title.to_lowercase();
        if title.contains(needle) {
            score += TITLE_MATCH;
            if title == needle {
                score += TITLE_EXACT;
            }
            if title.starts_with(needle) {
                score += TITLE_PREFIX;
            }
        }
        if anime.genre.to_lowercase().contains(needle) {
            score += GENRE_MATCH;
        }
        if anime.description.to_lowercase().contains(needle) {
            score += DESCRIPTION_MATCH;
        }
    }
    score += anime.rating;
    score += (anime.episodes.len() as f64 * PER_EPISODE).min(MAX_EPISODE_BONUS);
    score
}

fn episode_matches(episode: &Episode, needle: &str) -> bool {
    episode.title.to_lowercase().contains(needle)
}

fn collect_comments(comments: &[Comment], needle: &str, out: &mut Vec<Comment>) {
    for comment in comments {
        if comment.content.to_lowercase().contains(needle)
            || comment.username.to_lowercase().contains(needle)
        {
            out.push(comment.clone());
        }
        collect_comments(&comment.replies, needle, out);
    }
}
