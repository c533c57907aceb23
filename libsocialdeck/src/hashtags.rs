//! Hashtag groups
//!
//! Named sets of hashtags stored in the application state, and the helper
//! that appends them to a post without breaking the platform's length limit.

use uuid::Uuid;

use crate::error::{DeckError, Result};
use crate::types::{AppState, HashtagGroup};

/// Canonical `#tag` form of user input
///
/// Leading `#`s and whitespace are dropped, as is any character that is not
/// alphanumeric or `_`. Fails when nothing is left.
pub fn normalize_hashtag(input: &str) -> Result<String> {
    let body: String = input
        .trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    if body.is_empty() {
        return Err(DeckError::InvalidInput(format!(
            "'{}' is not a valid hashtag",
            input.trim()
        )));
    }
    Ok(format!("#{}", body))
}

/// Normalize a list of tags, dropping duplicates while keeping order
pub fn normalize_all<S: AsRef<str>>(tags: &[S]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = normalize_hashtag(tag.as_ref())?;
        if !normalized.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            normalized.push(tag);
        }
    }
    Ok(normalized)
}

fn find_index(state: &AppState, name_or_id: &str) -> Option<usize> {
    state
        .hashtag_groups
        .iter()
        .position(|g| g.id == name_or_id || g.name.eq_ignore_ascii_case(name_or_id))
}

/// Look a group up by id or (case-insensitive) name
pub fn find_group<'a>(state: &'a AppState, name_or_id: &str) -> Option<&'a HashtagGroup> {
    find_index(state, name_or_id).map(|i| &state.hashtag_groups[i])
}

/// Create a group, or replace the tags of an existing group with that name
pub fn upsert_group<S: AsRef<str>>(
    state: &mut AppState,
    name: &str,
    tags: &[S],
) -> Result<HashtagGroup> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DeckError::InvalidInput(
            "Hashtag group name cannot be empty".to_string(),
        ));
    }
    let hashtags = normalize_all(tags)?;
    if hashtags.is_empty() {
        return Err(DeckError::InvalidInput(format!(
            "Hashtag group '{}' needs at least one hashtag",
            name
        )));
    }

    match find_index(state, name) {
        Some(index) => {
            let group = &mut state.hashtag_groups[index];
            group.hashtags = hashtags;
            Ok(group.clone())
        }
        None => {
            let group = HashtagGroup {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                hashtags,
            };
            state.hashtag_groups.push(group.clone());
            Ok(group)
        }
    }
}

pub fn remove_group(state: &mut AppState, name_or_id: &str) -> Result<HashtagGroup> {
    let index = find_index(state, name_or_id).ok_or_else(|| {
        DeckError::InvalidInput(format!("No hashtag group named '{}'", name_or_id))
    })?;
    Ok(state.hashtag_groups.remove(index))
}

/// Append as many of `tags` as fit within `limit` characters
///
/// Tags already present in the content are skipped. The tag line is
/// separated from the content by a blank line; with no limit every tag is
/// appended.
pub fn append_hashtags<S: AsRef<str>>(content: &str, tags: &[S], limit: Option<usize>) -> String {
    let mut present = tags_in(content);
    let mut result = content.trim_end().to_string();
    let mut length = result.chars().count();
    let mut first = true;

    for tag in tags {
        let tag = tag.as_ref();
        let key = tag.to_lowercase();
        if tag.is_empty() || present.contains(&key) {
            continue;
        }

        let separator = if first { "\n\n" } else { " " };
        let added = separator.chars().count() + tag.chars().count();
        if limit.is_some_and(|limit| length + added > limit) {
            continue;
        }

        result.push_str(separator);
        result.push_str(tag);
        length += added;
        first = false;
        present.push(key);
    }
    result
}

/// Lowercased `#word` tokens of `content`, whole tags only
fn tags_in(content: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '#' {
            continue;
        }
        let mut tag = String::from("#");
        while let Some(&next) = chars.peek() {
            if !(next.is_alphanumeric() || next == '_') {
                break;
            }
            tag.extend(next.to_lowercase());
            chars.next();
        }
        if tag.len() > 1 {
            tags.push(tag);
        }
    }
    tags
}
