//! Pagination helpers for GraphQL cursors and REST page numbers.
use std::future::Future;

use http::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::{ForgeClient, PassContext, Result};

/// Hard cap on pages fetched by any pagination loop.
///
/// A forge bug (or a loader bug) that keeps answering
/// `hasNextPage: true` must not run away with the pass.
pub const MAX_PAGES: usize = 100;

/// Page size requested from REST list endpoints.
const PER_PAGE: usize = 100;

/// GraphQL connection page info.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Whether another page follows
    pub has_next_page: bool,
    /// Cursor to resume from
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// The state before the first page.
    pub fn start() -> Self {
        PageInfo {
            has_next_page: true,
            end_cursor: None,
        }
    }
}

/// Drive a cursor-paginated GraphQL query to completion.
///
/// `fetch` receives the cursor to resume from (`None` on the first
/// page) and returns one page of items plus the next page info. The
/// loop stops after [`MAX_PAGES`] pages even if the forge claims
/// more.
pub async fn paginate<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, PageInfo)>>,
{
    let mut items = Vec::new();
    let mut page_info = PageInfo::start();
    let mut pages = 0;
    while page_info.has_next_page {
        if pages >= MAX_PAGES {
            tracing::warn!(pages, "pagination sanity cap reached, truncating listing");
            break;
        }
        let (batch, info) = fetch(page_info.end_cursor.clone()).await?;
        items.extend(batch);
        page_info = info;
        pages += 1;
    }
    Ok(items)
}

impl ForgeClient {
    /// Collect every page of a REST list endpoint.
    ///
    /// Uses `per_page`/`page` parameters and stops on the first short
    /// page, capped at [`MAX_PAGES`].
    pub async fn rest_paginated<T>(
        &self,
        ctx: &PassContext,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let per_page = PER_PAGE.to_string();
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let page_str = page.to_string();
            let mut q: Vec<(&str, &str)> = query.to_vec();
            q.push(("per_page", &per_page));
            q.push(("page", &page_str));
            let batch: Vec<T> = self.rest(ctx, Method::GET, path, &q, None, None).await?;
            let len = batch.len();
            items.extend(batch);
            if len < PER_PAGE {
                return Ok(items);
            }
        }
        tracing::warn!(path, "pagination sanity cap reached, truncating listing");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_every_page_exactly_once_up_to_the_cap() {
        // 99 pages claiming more, the 100th saying stop: everything
        // is collected, nothing twice
        let pages = MAX_PAGES;
        let collected = paginate(move |cursor| async move {
            let next = cursor.map(|c| c.parse::<usize>().unwrap() + 1).unwrap_or(1);
            Ok((vec![next], PageInfo {
                has_next_page: next < pages,
                end_cursor: Some(next.to_string()),
            }))
        })
        .await
        .unwrap();
        assert_eq!(collected.len(), MAX_PAGES);
        assert_eq!(collected, (1..=MAX_PAGES).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn cap_breaks_a_stuck_pager() {
        let collected = paginate(|_| async {
            Ok((vec![0u8], PageInfo {
                has_next_page: true,
                end_cursor: Some("stuck".to_string()),
            }))
        })
        .await
        .unwrap();
        assert_eq!(collected.len(), MAX_PAGES);
    }

    #[tokio::test]
    async fn errors_interrupt_the_loop() {
        let mut calls = 0u32;
        let result: Result<Vec<u8>> = paginate(|_| {
            calls += 1;
            let fail = calls >= 2;
            async move {
                if fail {
                    Err(crate::Error::GraphQl("boom".to_string()))
                } else {
                    Ok((vec![1u8], PageInfo {
                        has_next_page: true,
                        end_cursor: Some("c".to_string()),
                    }))
                }
            }
        })
        .await;
        assert!(result.is_err());
    }
}
