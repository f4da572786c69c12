use crate::error::AwsError;
use std::future::Future;

/// Fetch details for `ids` in contiguous chunks of at most `batch_size`,
/// one call per chunk, concatenating results in chunk order. Provider APIs
/// impose the chunk limit (10 for ECS services, 100 for ECS tasks).
///
/// An empty identifier slice issues no calls. A failing chunk aborts the
/// whole operation, matching the collector's all-or-nothing policy.
pub async fn describe_in_batches<I, T, F, Fut>(
    ids: &[I],
    batch_size: usize,
    mut fetch_batch: F,
) -> Result<Vec<T>, AwsError>
where
    I: Clone,
    F: FnMut(Vec<I>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, AwsError>>,
{
    let mut results = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(batch_size.max(1)) {
        results.extend(fetch_batch(chunk.to_vec()).await?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn twelve_ids_batch_ten_issues_two_calls() {
        let ids: Vec<u32> = (0..12).collect();
        let mut sizes = Vec::new();

        let details = describe_in_batches(&ids, 10, |chunk| {
            sizes.push(chunk.len());
            async move { Ok(chunk.iter().map(|id| id * 100).collect::<Vec<_>>()) }
        })
        .await
        .unwrap();

        assert_eq!(sizes, vec![10, 2]);
        assert_eq!(details.len(), 12);
        // Input order survives chunking.
        assert_eq!(details[0], 0);
        assert_eq!(details[9], 900);
        assert_eq!(details[11], 1100);
    }

    #[tokio::test]
    async fn no_ids_issues_no_calls() {
        let ids: Vec<u32> = Vec::new();
        let mut calls = 0usize;

        let details: Vec<u32> = describe_in_batches(&ids, 10, |chunk| {
            calls += 1;
            async move { Ok(chunk) }
        })
        .await
        .unwrap();

        assert_eq!(calls, 0);
        assert!(details.is_empty());
    }

    #[tokio::test]
    async fn exact_multiple_fills_every_chunk() {
        let ids: Vec<u32> = (0..20).collect();
        let mut sizes = Vec::new();

        describe_in_batches(&ids, 10, |chunk| {
            sizes.push(chunk.len());
            async move { Ok(chunk) }
        })
        .await
        .unwrap();

        assert_eq!(sizes, vec![10, 10]);
    }

    #[tokio::test]
    async fn failing_chunk_aborts_the_operation() {
        let ids: Vec<u32> = (0..12).collect();
        let mut calls = 0usize;

        let result: Result<Vec<u32>, _> = describe_in_batches(&ids, 10, |chunk| {
            calls += 1;
            let fail = calls > 1;
            async move {
                if fail {
                    Err(AwsError::api("access denied"))
                } else {
                    Ok(chunk)
                }
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
