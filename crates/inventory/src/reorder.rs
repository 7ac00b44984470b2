//! "Needs reordering" projection over a snapshot of articles.

use stockledger_core::AggregateRoot;

use crate::article::Article;

/// One article flagged for reordering, with the threshold that flagged it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderLine {
    pub article: Article,
    pub effective_threshold: i64,
}

/// Per-article threshold if set, else the global one.
pub fn effective_threshold(article: &Article, global_threshold: i64) -> i64 {
    article.reorder_threshold().unwrap_or(global_threshold)
}

/// Articles whose stock is at or below their effective threshold.
///
/// Sorted by stock ascending, then display name, then identifier. Pure: the
/// caller passes the global threshold explicitly.
pub fn compute_reorder_set<'a, I>(articles: I, global_threshold: i64) -> Vec<ReorderLine>
where
    I: IntoIterator<Item = &'a Article>,
{
    let mut lines: Vec<ReorderLine> = articles
        .into_iter()
        .filter_map(|article| {
            let threshold = effective_threshold(article, global_threshold);
            (article.stock() <= threshold).then(|| ReorderLine {
                article: article.clone(),
                effective_threshold: threshold,
            })
        })
        .collect();

    lines.sort_by(|a, b| {
        a.article
            .stock()
            .cmp(&b.article.stock())
            .then_with(|| a.article.display_name().cmp(b.article.display_name()))
            .then_with(|| a.article.id().cmp(b.article.id()))
    });
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::Balance;
    use proptest::prelude::*;
    use stockledger_core::ArticleId;

    fn article(id: &str, name: &str, stock: i64, threshold: Option<i64>) -> Article {
        Article::restore(
            ArticleId::parse(id).unwrap(),
            name,
            Balance::new(stock, 0).unwrap(),
            threshold,
        )
    }

    #[test]
    fn per_article_threshold_overrides_global() {
        let a = article("A", "Alpha", 3, None);
        let b = article("B", "Beta", 3, Some(0));

        let set = compute_reorder_set([&a, &b], 3);
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].article.id().as_str(), "A");
        assert_eq!(set[0].effective_threshold, 3);
    }

    #[test]
    fn sorted_by_stock_then_name_then_id() {
        let articles = vec![
            article("C", "Zeta", 1, None),
            article("B", "Alpha", 1, None),
            article("A", "Alpha", 1, None),
            article("D", "Omega", 0, None),
        ];
        let ids: Vec<_> = compute_reorder_set(&articles, 5)
            .into_iter()
            .map(|l| l.article.id().to_string())
            .collect();
        assert_eq!(ids, vec!["D", "A", "B", "C"]);
    }

    #[test]
    fn empty_input_gives_empty_set() {
        assert!(compute_reorder_set(std::iter::empty(), 3).is_empty());
    }

    fn any_article() -> impl Strategy<Value = Article> {
        ("[A-F]{1,3}", "[a-c]{0,3}", 0i64..10, prop::option::of(0i64..10)).prop_map(
            |(id, name, stock, threshold)| article(&id, &name, stock, threshold),
        )
    }

    proptest! {
        /// Property: the projection is idempotent and does not depend on input order.
        #[test]
        fn reorder_set_is_order_stable(
            articles in prop::collection::vec(any_article(), 0..20),
            global in 0i64..10,
        ) {
            let first = compute_reorder_set(&articles, global);
            let again = compute_reorder_set(&articles, global);
            prop_assert_eq!(&first, &again);

            let mut reversed = articles.clone();
            reversed.reverse();
            let from_reversed = compute_reorder_set(&reversed, global);
            let keys = |set: &[ReorderLine]| -> Vec<(i64, String, String)> {
                set.iter()
                    .map(|l| {
                        (
                            l.article.stock(),
                            l.article.display_name().to_string(),
                            l.article.id().to_string(),
                        )
                    })
                    .collect()
            };
            prop_assert_eq!(keys(&first), keys(&from_reversed));

            for line in &first {
                prop_assert!(line.article.stock() <= line.effective_threshold);
            }
        }

        /// Property: with a per-article threshold, the global one is irrelevant.
        #[test]
        fn per_article_threshold_ignores_global(
            stock in 0i64..10,
            t in 0i64..10,
            global in 0i64..10,
        ) {
            let a = article("X", "x", stock, Some(t));
            let included = !compute_reorder_set([&a], global).is_empty();
            prop_assert_eq!(included, stock <= t);
        }
    }
}
