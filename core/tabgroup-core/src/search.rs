//! Tab and bookmark search backing the overlay.

use std::collections::HashSet;
use tabgroup_protocol::{Bookmark, SearchResult, Tab, TabId};
use tracing::debug;

use crate::classifier::{classify, HostOverrides};
use crate::error::HostError;
use crate::host::{BookmarkHost, BookmarkQuery, TabHost};

/// Bookmark trees are shallow; this only guards against a cyclic parent chain.
const MAX_BOOKMARK_DEPTH: usize = 64;

/// Tabs whose title or URL contains `query` (case-insensitive), plus every tab
/// whose group label contains it, followed by matching bookmarks.
pub fn search(
    tabs: &dyn TabHost,
    bookmarks: &dyn BookmarkHost,
    overrides: &HostOverrides,
    query: &str,
) -> Result<Vec<SearchResult>, HostError> {
    let all_tabs = tabs.query_tabs()?;
    let mut results: Vec<SearchResult> = match_tabs(&all_tabs, overrides, query)
        .into_iter()
        .map(tab_result)
        .collect();

    for bookmark in bookmarks.search_bookmarks(&BookmarkQuery::Text(query.to_string()))? {
        let path = bookmark_path(bookmarks, &bookmark)?;
        results.push(SearchResult::Bookmark {
            id: bookmark.id,
            title: bookmark.title,
            url: bookmark.url,
            path,
        });
    }

    debug!(query, results = results.len(), "Search completed");
    Ok(results)
}

pub fn match_tabs<'t>(tabs: &'t [Tab], overrides: &HostOverrides, query: &str) -> Vec<&'t Tab> {
    let needle = query.to_lowercase();
    let mut matched: Vec<&Tab> = tabs
        .iter()
        .filter(|tab| {
            tab.title.to_lowercase().contains(&needle) || tab.url.to_lowercase().contains(&needle)
        })
        .collect();

    let mut seen: HashSet<TabId> = matched.iter().map(|tab| tab.id).collect();
    for tab in tabs {
        if seen.contains(&tab.id) {
            continue;
        }
        if classify(&tab.url, overrides).to_lowercase().contains(&needle) {
            seen.insert(tab.id);
            matched.push(tab);
        }
    }
    matched
}

/// Titles of the folders above `bookmark`, root first. Untitled folders
/// (the invisible root) are omitted.
pub fn bookmark_path(
    bookmarks: &dyn BookmarkHost,
    bookmark: &Bookmark,
) -> Result<Vec<String>, HostError> {
    let mut path = Vec::new();
    let mut parent = bookmark.parent_id.clone();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_BOOKMARK_DEPTH {
            break;
        }
        let node = bookmarks.get_bookmark(&parent_id)?;
        if !node.title.is_empty() {
            path.push(node.title.clone());
        }
        parent = node.parent_id;
    }
    path.reverse();
    Ok(path)
}

fn tab_result(tab: &Tab) -> SearchResult {
    SearchResult::Tab {
        id: tab.id,
        title: tab.title.clone(),
        url: tab.url.clone(),
        fav_icon_url: tab.fav_icon_url.clone(),
        group_id: tab.group_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBrowser;

    #[test]
    fn matches_title_and_url_case_insensitively() {
        let browser = FakeBrowser::new();
        let a = browser.add_titled_tab("https://docs.rs/serde", "Serde Docs", None);
        browser.add_titled_tab("https://example.com", "Nothing here", None);

        let results =
            search(&browser, &browser, &HostOverrides::default(), "SERDE").expect("search");
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], SearchResult::Tab { id, .. } if *id == a));
    }

    #[test]
    fn group_label_matches_pull_in_whole_host() {
        let browser = FakeBrowser::new();
        let overrides = HostOverrides::new([("github.com", "Code")]);
        let a = browser.add_titled_tab("https://github.com/a", "Repo A", None);
        let b = browser.add_titled_tab("https://github.com/b", "Code search", None);

        let results = search(&browser, &browser, &overrides, "code").expect("search");
        let ids: Vec<TabId> = results
            .iter()
            .filter_map(|r| match r {
                SearchResult::Tab { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn bookmarks_carry_folder_path() {
        let browser = FakeBrowser::new();
        browser.add_bookmark("0", None, "", None);
        browser.add_bookmark("1", Some("0"), "Bookmarks Bar", None);
        browser.add_bookmark("2", Some("1"), "Rust", None);
        browser.add_bookmark("3", Some("2"), "The Book", Some("https://doc.rust-lang.org/book/"));

        let results =
            search(&browser, &browser, &HostOverrides::default(), "book").expect("search");
        assert_eq!(
            results,
            vec![SearchResult::Bookmark {
                id: "3".to_string(),
                title: "The Book".to_string(),
                url: Some("https://doc.rust-lang.org/book/".to_string()),
                path: vec!["Bookmarks Bar".to_string(), "Rust".to_string()],
            }]
        );
    }
}
