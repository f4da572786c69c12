use crate::error::AwsError;
use std::future::Future;

/// One page from a token-paginated listing call.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// Upper bound on pages per collection. A provider handing back a token
/// cycle would otherwise spin forever.
pub const DEFAULT_PAGE_CAP: usize = 1000;

/// Drive a token-paginated listing to exhaustion, concatenating items in
/// provider order. The closure receives the continuation token from the
/// previous page (`None` on the first call). An absent or empty next token
/// ends the collection.
///
/// Any page failure aborts the whole collection; pages already fetched are
/// discarded.
pub async fn collect_pages<T, F, Fut>(fetch_page: F) -> Result<Vec<T>, AwsError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, AwsError>>,
{
    collect_pages_capped(DEFAULT_PAGE_CAP, fetch_page).await
}

pub async fn collect_pages_capped<T, F, Fut>(
    cap: usize,
    mut fetch_page: F,
) -> Result<Vec<T>, AwsError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, AwsError>>,
{
    let mut items = Vec::new();
    let mut token: Option<String> = None;

    for _ in 0..cap {
        let page = fetch_page(token.take()).await?;
        items.extend(page.items);
        match page.next_token.filter(|t| !t.is_empty()) {
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }

    Err(AwsError::PageLimitExceeded { pages: cap })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(items: Vec<u32>, next: Option<&str>) -> Page<u32> {
        Page {
            items,
            next_token: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn collects_every_page_in_order() {
        let mut calls = 0usize;
        let items = collect_pages(|token| {
            calls += 1;
            let page = match token.as_deref() {
                None => page(vec![1, 2, 3], Some("t1")),
                Some("t1") => page(vec![4, 5, 6], Some("t2")),
                Some("t2") => page(vec![7, 8], None),
                other => unreachable!("unexpected token {:?}", other),
            };
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn single_page_issues_one_call() {
        let mut calls = 0usize;
        let items = collect_pages(|_token| {
            calls += 1;
            async { Ok(page(vec![9], None)) }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![9]);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn empty_string_token_ends_the_listing() {
        let mut calls = 0usize;
        let items = collect_pages(|_token| {
            calls += 1;
            async { Ok(page(vec![1], Some(""))) }
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1]);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn page_failure_discards_earlier_pages() {
        let result = collect_pages(|token| {
            let fail = token.is_some();
            async move {
                if fail {
                    Err(AwsError::api("throttled"))
                } else {
                    Ok(page(vec![1, 2], Some("t1")))
                }
            }
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn token_cycle_trips_the_safety_cap() {
        let mut calls = 0usize;
        let result = collect_pages_capped(5, |_token| {
            calls += 1;
            async { Ok(page(vec![1], Some("again"))) }
        })
        .await;

        assert_eq!(calls, 5);
        assert!(matches!(
            result,
            Err(AwsError::PageLimitExceeded { pages: 5 })
        ));
    }
}
