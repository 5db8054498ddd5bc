//! Accounts and per-user likes, dislikes and favorites

use std::collections::BTreeMap;

use super::{find_anime, timestamp, Actor, Catalog, CatalogError, CatalogEvent, CatalogResult};
use crate::constants::catalog::{placeholder_avatar, MAX_USERNAME_LENGTH, MIN_USERNAME_LENGTH};
use crate::models::{
    Favorite, InteractionKind, InteractionOutcome, InteractionStats, Reaction, User,
    UserInteractions,
};

impl Catalog {
    // ========================================================================
    // Users
    // ========================================================================

    /// Create an account. `password_hash` must already be hashed.
    pub async fn register(
        &self,
        username: &str,
        password_hash: String,
        profile_picture: Option<String>,
    ) -> CatalogResult<User> {
        let username = validate_username(username)?;
        let message = format!("Register user {}", username);

        self.mutate(message, move |doc| {
            if doc
                .users
                .iter()
                .any(|u| u.username.eq_ignore_ascii_case(&username))
            {
                return Err(CatalogError::Validation(
                    "Username already exists".to_string(),
                ));
            }

            let user = User {
                id: uuid::Uuid::new_v4().to_string(),
                profile_picture: profile_picture
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| placeholder_avatar(&username)),
                username,
                password_hash,
                created_at: timestamp(),
            };
            doc.users.push(user.clone());
            let event = CatalogEvent::UserRegistered {
                username: user.username.clone(),
            };
            Ok((user, event))
        })
        .await
    }

    /// Case-insensitive username lookup
    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        let username = username.trim();
        self.read(|doc| {
            doc.users
                .iter()
                .find(|u| u.username.eq_ignore_ascii_case(username))
                .cloned()
        })
        .await
    }

    pub async fn user_by_id(&self, id: &str) -> Option<User> {
        self.read(|doc| doc.users.iter().find(|u| u.id == id).cloned())
            .await
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    /// A user's interactions; empty lists when they have none yet
    pub async fn interactions_for(&self, user_id: &str) -> UserInteractions {
        self.read(|doc| {
            doc.interactions
                .iter()
                .find(|i| i.user_id == user_id)
                .cloned()
                .unwrap_or_else(|| UserInteractions {
                    user_id: user_id.to_string(),
                    ..Default::default()
                })
        })
        .await
    }

    /// Flip a like, dislike or favorite. Setting a like clears a dislike on
    /// the same target and vice versa. Favorites apply to the whole anime.
    pub async fn toggle_interaction(
        &self,
        actor: &Actor,
        kind: InteractionKind,
        anime_id: i64,
        episode_num: Option<i64>,
    ) -> CatalogResult<InteractionOutcome> {
        let actor = actor.clone();
        let message = format!("Toggle {:?} on anime {} by {}", kind, anime_id, actor.username);

        self.mutate(message, move |doc| {
            find_anime(doc, anime_id)?;
            let entry = interactions_entry(&mut doc.interactions, &actor);
            let now = timestamp();

            let active = match kind {
                InteractionKind::Like => toggle_reaction(
                    &mut entry.likes,
                    &mut entry.dislikes,
                    anime_id,
                    episode_num,
                    now,
                ),
                InteractionKind::Dislike => toggle_reaction(
                    &mut entry.dislikes,
                    &mut entry.likes,
                    anime_id,
                    episode_num,
                    now,
                ),
                InteractionKind::Favorite => {
                    let before = entry.favorites.len();
                    entry.favorites.retain(|f| f.anime_id != anime_id);
                    if entry.favorites.len() == before {
                        entry.favorites.push(Favorite {
                            anime_id,
                            timestamp: now,
                        });
                        true
                    } else {
                        false
                    }
                }
            };

            let outcome = InteractionOutcome {
                active,
                interactions: entry.clone(),
            };
            let event = CatalogEvent::InteractionsChanged {
                user_id: actor.user_id,
            };
            Ok((outcome, event))
        })
        .await
    }

    /// Remove an interaction. For likes and dislikes without an episode
    /// number, every reaction on the anime (episodes included) is removed.
    pub async fn remove_interaction(
        &self,
        actor: &Actor,
        kind: InteractionKind,
        anime_id: i64,
        episode_num: Option<i64>,
    ) -> CatalogResult<UserInteractions> {
        let actor = actor.clone();
        let message = format!("Remove {:?} on anime {} by {}", kind, anime_id, actor.username);

        self.mutate(message, move |doc| {
            let entry = doc
                .interactions
                .iter_mut()
                .find(|i| i.user_id == actor.user_id)
                .ok_or_else(|| {
                    CatalogError::NotFound(format!("Interactions for user {}", actor.username))
                })?;

            let matches = |r: &Reaction| {
                r.anime_id == anime_id && (episode_num.is_none() || r.episode_num == episode_num)
            };
            match kind {
                InteractionKind::Like => entry.likes.retain(|r| !matches(r)),
                InteractionKind::Dislike => entry.dislikes.retain(|r| !matches(r)),
                InteractionKind::Favorite => entry.favorites.retain(|f| f.anime_id != anime_id),
            }

            let interactions = entry.clone();
            let event = CatalogEvent::InteractionsChanged {
                user_id: actor.user_id,
            };
            Ok((interactions, event))
        })
        .await
    }

    /// Counters for an anime across all users, keyed `"<animeId>"` for the
    /// anime itself and `"<animeId>_<episodeNum>"` per episode.
    pub async fn interaction_stats(&self, anime_id: i64) -> BTreeMap<String, InteractionStats> {
        self.read(|doc| {
            let mut stats: BTreeMap<String, InteractionStats> = BTreeMap::new();
            let key = |episode_num: Option<i64>| match episode_num {
                Some(ep) => format!("{}_{}", anime_id, ep),
                None => anime_id.to_string(),
            };

            for user in &doc.interactions {
                for like in user.likes.iter().filter(|r| r.anime_id == anime_id) {
                    stats.entry(key(like.episode_num)).or_default().likes += 1;
                }
                for dislike in user.dislikes.iter().filter(|r| r.anime_id == anime_id) {
                    stats.entry(key(dislike.episode_num)).or_default().dislikes += 1;
                }
                if user.favorites.iter().any(|f| f.anime_id == anime_id) {
                    stats.entry(key(None)).or_default().favorites += 1;
                }
            }
            stats
        })
        .await
    }
}

fn validate_username(username: &str) -> CatalogResult<String> {
    let username = username.trim();
    let length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(CatalogError::Validation(format!(
            "Username must be {} to {} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(CatalogError::Validation(
            "Username may only contain letters, digits, '_', '-' and '.'".to_string(),
        ));
    }
    Ok(username.to_string())
}

fn interactions_entry<'a>(
    interactions: &'a mut Vec<UserInteractions>,
    actor: &Actor,
) -> &'a mut UserInteractions {
    let index = match interactions.iter().position(|i| i.user_id == actor.user_id) {
        Some(index) => index,
        None => {
            interactions.push(UserInteractions {
                user_id: actor.user_id.clone(),
                username: actor.username.clone(),
                created_at: timestamp(),
                ..Default::default()
            });
            interactions.len() - 1
        }
    };
    &mut interactions[index]
}

/// Returns whether the reaction is set afterwards
fn toggle_reaction(
    reactions: &mut Vec<Reaction>,
    opposite: &mut Vec<Reaction>,
    anime_id: i64,
    episode_num: Option<i64>,
    now: String,
) -> bool {
    let before = reactions.len();
    reactions.retain(|r| !r.targets(anime_id, episode_num));
    if reactions.len() != before {
        return false;
    }
    opposite.retain(|r| !r.targets(anime_id, episode_num));
    reactions.push(Reaction {
        anime_id,
        episode_num,
        timestamp: now,
    });
    true
}
