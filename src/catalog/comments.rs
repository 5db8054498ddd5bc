//! Threaded comments on anime and episodes

use rand::Rng;

use super::{find_anime, timestamp, Actor, Catalog, CatalogError, CatalogEvent, CatalogResult};
use crate::constants::catalog::{placeholder_avatar, MAX_COMMENT_LENGTH};
use crate::models::{Comment, CommentInput};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

impl Catalog {
    /// Top-level comments on an anime (optionally one episode), newest first.
    /// Replies stay nested under their parent.
    pub async fn comments_for(&self, anime_id: i64, episode_num: Option<i64>) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .read(|doc| {
                doc.comments
                    .iter()
                    .filter(|c| c.anime_id == anime_id)
                    .filter(|c| episode_num.is_none() || c.episode_num == episode_num)
                    .cloned()
                    .collect()
            })
            .await;
        comments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        comments
    }

    /// Post a comment. With a `parent_id` it is nested under that comment at
    /// any depth; an unknown parent posts it at the top level instead.
    pub async fn add_comment(&self, actor: &Actor, input: CommentInput) -> CatalogResult<Comment> {
        let content = input.content.trim().to_string();
        if content.is_empty() {
            return Err(CatalogError::Validation("Comment content is required".to_string()));
        }
        if content.chars().count() > MAX_COMMENT_LENGTH {
            return Err(CatalogError::Validation(format!(
                "Comment must be at most {} characters",
                MAX_COMMENT_LENGTH
            )));
        }

        let username = actor.username.clone();
        let message = format!("Add comment by {} on anime {}", username, input.anime_id);
        self.mutate(message, move |doc| {
            find_anime(doc, input.anime_id)?;

            let user_avatar = doc
                .users
                .iter()
                .find(|u| u.username == username)
                .map(|u| u.profile_picture.clone())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| placeholder_avatar(&username));

            let mut comment = Comment {
                id: comment_id(),
                username,
                anime_id: input.anime_id,
                episode_num: input.episode_num,
                content,
                user_avatar,
                timestamp: timestamp(),
                likes: 0,
                replies: Vec::new(),
                parent_id: None,
            };

            let parent = match input.parent_id.as_deref() {
                Some(id) => find_comment_mut(&mut doc.comments, id),
                None => None,
            };
            match parent {
                Some(parent) => {
                    comment.parent_id = Some(parent.id.clone());
                    parent.replies.push(comment.clone());
                }
                None => doc.comments.push(comment.clone()),
            }

            let event = CatalogEvent::CommentAdded {
                anime_id: comment.anime_id,
                comment_id: comment.id.clone(),
            };
            Ok((comment, event))
        })
        .await
    }

    /// Delete a comment and all of its replies. Only the author or an admin
    /// may do this.
    pub async fn delete_comment(&self, actor: &Actor, id: &str) -> CatalogResult<Comment> {
        let actor = actor.clone();
        let id = id.to_string();
        let message = format!("Delete comment {}", id);
        self.mutate(message, move |doc| {
            let comment = find_comment(&doc.comments, &id)
                .ok_or_else(|| CatalogError::NotFound(format!("Comment {}", id)))?;
            if comment.username != actor.username && !actor.is_admin {
                return Err(CatalogError::Forbidden(
                    "Only the author or an admin can delete this comment".to_string(),
                ));
            }
            let removed = remove_comment(&mut doc.comments, &id)
                .ok_or_else(|| CatalogError::NotFound(format!("Comment {}", id)))?;
            Ok((removed, CatalogEvent::CommentDeleted { comment_id: id }))
        })
        .await
    }

    pub async fn like_comment(&self, id: &str) -> CatalogResult<Comment> {
        let id = id.to_string();
        self.mutate(format!("Like comment {}", id), move |doc| {
            let comment = find_comment_mut(&mut doc.comments, &id)
                .ok_or_else(|| CatalogError::NotFound(format!("Comment {}", id)))?;
            comment.likes += 1;
            Ok((comment.clone(), CatalogEvent::CommentLiked { comment_id: id }))
        })
        .await
    }
}

/// `<millis>_<9 base36 chars>`
fn comment_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}

fn find_comment<'a>(comments: &'a [Comment], id: &str) -> Option<&'a Comment> {
    for comment in comments {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_comment(&comment.replies, id) {
            return Some(found);
        }
    }
    None
}

fn find_comment_mut<'a>(comments: &'a mut [Comment], id: &str) -> Option<&'a mut Comment> {
    for comment in comments.iter_mut() {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_comment_mut(&mut comment.replies, id) {
            return Some(found);
        }
    }
    None
}

fn remove_comment(comments: &mut Vec<Comment>, id: &str) -> Option<Comment> {
    if let Some(index) = comments.iter().position(|c| c.id == id) {
        return Some(comments.remove(index));
    }
    comments
        .iter_mut()
        .find_map(|comment| remove_comment(&mut comment.replies, id))
}
