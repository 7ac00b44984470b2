//! Read-side filters over an article snapshot.

use stockledger_core::AggregateRoot;

use crate::article::Article;

/// Case-insensitive substring match on identifier or display name.
///
/// A blank query returns every article. Input order is preserved.
pub fn search_articles<'a, I>(articles: I, query: &str) -> Vec<Article>
where
    I: IntoIterator<Item = &'a Article>,
{
    let needle = query.trim().to_lowercase();
    articles
        .into_iter()
        .filter(|a| {
            needle.is_empty()
                || a.id().as_str().to_lowercase().contains(&needle)
                || a.display_name().to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Articles holding warranty units, largest warranty first, then by identifier.
pub fn warranty_table<'a, I>(articles: I) -> Vec<Article>
where
    I: IntoIterator<Item = &'a Article>,
{
    let mut table: Vec<Article> = articles
        .into_iter()
        .filter(|a| a.warranty() > 0)
        .cloned()
        .collect();
    table.sort_by(|a, b| b.warranty().cmp(&a.warranty()).then_with(|| a.id().cmp(b.id())));
    table
}
