//! Behavior tests for scalar and group views over one source.

use crate::error::LoadError;
use crate::source::QuerySource;

use super::mocks::{sample_pages, MockPageStore, Page, PageCriteria};

fn page_source() -> QuerySource<PageCriteria, Page> {
    QuerySource::new(MockPageStore::new(sample_pages()))
}

// ========== Section 1: Batching and deduplication ==========

#[tokio::test]
async fn test_concurrent_loads_share_one_fetch() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);

    let (a, b, c) = tokio::join!(by_id.load(1), by_id.load(2), by_id.load(3));

    assert_eq!(a.unwrap().unwrap().id, 1);
    assert_eq!(b.unwrap().unwrap().id, 2);
    assert_eq!(c.unwrap().unwrap().id, 3);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_concurrent_loads_for_one_key_collapse() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);

    let (a, b) = tokio::join!(by_id.load(1), by_id.load(1));

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_load_many_preserves_input_order() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);

    let pages = by_id.load_many(vec![3, 1, 2]).await.unwrap();

    let ids: Vec<Option<u64>> = pages.iter().map(|page| page.as_ref().map(|p| p.id)).collect();
    assert_eq!(ids, vec![Some(3), Some(1), Some(2)]);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_load_many_mixes_cache_hits_and_misses_in_order() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);

    by_id.load(2).await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    // 2 is cached, 1 and 4 go through a second fetch; order is unchanged.
    let pages = by_id.load_many(vec![1, 2, 4]).await.unwrap();

    let ids: Vec<Option<u64>> = pages.iter().map(|page| page.as_ref().map(|p| p.id)).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(4)]);
    assert_eq!(source.fetch_count(), 2);
}

// ========== Section 2: Negative entries and retries ==========

#[tokio::test]
async fn test_missing_key_resolves_to_none_and_is_cached() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);

    assert_eq!(by_id.load(99).await.unwrap(), None);
    assert_eq!(source.fetch_count(), 1);

    // The absence is remembered; no second fetch.
    assert_eq!(by_id.load(99).await.unwrap(), None);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_fetch_failure_reaches_every_waiter_and_leaves_no_entries() {
    let store = MockPageStore::new(sample_pages());
    store.fail_next_fetch();
    let source = QuerySource::new(store);
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);

    let (a, b) = tokio::join!(by_id.load(1), by_id.load(2));

    assert_eq!(a, Err(LoadError::fetch("mock store unavailable")));
    assert_eq!(b, Err(LoadError::fetch("mock store unavailable")));

    // The failed keys were not cached: the next load retries and succeeds.
    assert_eq!(by_id.load(1).await.unwrap().unwrap().id, 1);
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_key_collision_fails_the_dispatch() {
    let pages = vec![Page::new(1, "same", 1), Page::new(2, "same", 1)];
    let source = QuerySource::new(MockPageStore::new(pages));
    let by_slug = source.scalar_view(
        "by_slug",
        |page: &Page| page.slug.clone(),
        PageCriteria::slugs,
    );

    let result = by_slug.load("same".to_string()).await;

    assert_eq!(
        result,
        Err(LoadError::KeyCollision {
            key: "\"same\"".to_string()
        })
    );
}

// ========== Section 3: Cross-view priming ==========

#[tokio::test]
async fn test_scalar_fetch_primes_sibling_scalar_views() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);
    let by_slug = source.scalar_view(
        "by_slug",
        |page: &Page| page.slug.clone(),
        PageCriteria::slugs,
    );

    by_id.load_many(vec![1, 2, 3, 4]).await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    // Every page is already known by slug; no further fetch.
    let pages = by_slug
        .load_many(vec!["a".into(), "b".into(), "c".into(), "d".into()])
        .await
        .unwrap();
    let ids: Vec<Option<u64>> = pages.iter().map(|page| page.as_ref().map(|p| p.id)).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(source.fetch_count(), 1);

    let metrics = by_slug.metrics();
    assert_eq!(metrics.hits, 4);
    assert_eq!(metrics.misses, 0);
    assert_eq!(metrics.primes, 4);
}

#[tokio::test]
async fn test_scalar_fetch_does_not_prime_group_views() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);
    let for_user = source.group_view(
        "for_user",
        |page: &Page| page.user_id,
        |page: &Page| page.id,
        PageCriteria::user_ids,
    );

    // Both of user 2's pages pass through the scalar fetch...
    by_id.load_many(vec![3, 4]).await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    // ...but the group still has to ask the source: incidental
    // observations prove nothing about completeness.
    let pages = for_user.load(2).await.unwrap();
    assert_eq!(pages.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_group_fetch_primes_sibling_scalar_views() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);
    let for_user = source.group_view(
        "for_user",
        |page: &Page| page.user_id,
        |page: &Page| page.id,
        PageCriteria::user_ids,
    );

    for_user.load(1).await.unwrap();
    assert_eq!(source.fetch_count(), 1);

    // The group's members are single entities, complete under any scalar
    // key, so the scalar view answers from cache.
    assert_eq!(by_id.load(1).await.unwrap().unwrap().slug, "a");
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_negative_knowledge_is_not_propagated() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);
    let by_slug = source.scalar_view(
        "by_slug",
        |page: &Page| page.slug.clone(),
        PageCriteria::slugs,
    );

    // Id 99 is absent; only `by_id` learns that.
    assert_eq!(by_id.load(99).await.unwrap(), None);
    assert_eq!(source.fetch_count(), 1);

    // A slug load must still ask the source.
    assert_eq!(by_slug.load("zzz".to_string()).await.unwrap(), None);
    assert_eq!(source.fetch_count(), 2);
}

// ========== Section 4: Group semantics ==========

#[tokio::test]
async fn test_group_load_is_sorted_and_cached() {
    let source = page_source();
    let for_user = source.group_view(
        "for_user",
        |page: &Page| page.user_id,
        |page: &Page| page.id,
        PageCriteria::user_ids,
    );

    let pages = for_user.load(2).await.unwrap();
    assert_eq!(pages.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(source.fetch_count(), 1);

    for_user.load(2).await.unwrap();
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_group_sorting_is_independent_of_fetch_order() {
    // Same members, opposite store order: the comparator decides.
    let forward = vec![Page::new(3, "c", 2), Page::new(4, "d", 2)];
    let backward = vec![Page::new(4, "d", 2), Page::new(3, "c", 2)];

    for pages in [forward, backward] {
        let source = QuerySource::new(MockPageStore::new(pages));
        let for_user = source.group_view(
            "for_user",
            |page: &Page| page.user_id,
            |page: &Page| page.id,
            PageCriteria::user_ids,
        );

        let group = for_user.load(2).await.unwrap();
        assert_eq!(group.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 4]);
    }
}

#[tokio::test]
async fn test_empty_group_resolves_empty_and_is_cached() {
    let source = page_source();
    let for_user = source.group_view(
        "for_user",
        |page: &Page| page.user_id,
        |page: &Page| page.id,
        PageCriteria::user_ids,
    );

    assert!(for_user.load(42).await.unwrap().is_empty());
    assert_eq!(source.fetch_count(), 1);

    assert!(for_user.load(42).await.unwrap().is_empty());
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_concurrent_group_loads_share_one_fetch() {
    let source = page_source();
    let for_user = source.group_view(
        "for_user",
        |page: &Page| page.user_id,
        |page: &Page| page.id,
        PageCriteria::user_ids,
    );

    let (a, b) = tokio::join!(for_user.load(1), for_user.load(2));

    assert_eq!(a.unwrap().len(), 2);
    assert_eq!(b.unwrap().len(), 2);
    assert_eq!(source.fetch_count(), 1);
}

// ========== Section 5: Direct queries and diagnostics ==========

#[tokio::test]
async fn test_direct_query_primes_scalar_views_only() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);
    let for_user = source.group_view(
        "for_user",
        |page: &Page| page.user_id,
        |page: &Page| page.id,
        PageCriteria::user_ids,
    );

    let all = source.query(PageCriteria::All).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(source.fetch_count(), 1);

    // Scalar loads answer from the primed cache.
    assert_eq!(by_id.load(4).await.unwrap().unwrap().slug, "d");
    assert_eq!(source.fetch_count(), 1);

    // Group loads still go to the source.
    for_user.load(1).await.unwrap();
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_custom_dispatch_yields_still_batch_one_segment() {
    let source = QuerySource::with_config(
        MockPageStore::new(sample_pages()),
        crate::batch::BatchConfig::default().with_dispatch_yields(1),
    );
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);

    let (a, b) = tokio::join!(by_id.load(1), by_id.load(2));

    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_view_names_are_reported() {
    let source = page_source();
    let by_id = source.scalar_view("by_id", |page: &Page| page.id, PageCriteria::ids);
    let for_user = source.group_view(
        "for_user",
        |page: &Page| page.user_id,
        |page: &Page| page.id,
        PageCriteria::user_ids,
    );

    assert_eq!(by_id.name(), "by_id");
    assert_eq!(for_user.name(), "for_user");
}
