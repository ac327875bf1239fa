//! Blocking STAC Item Search client.
//!
//! Searches run lazily: the first page is requested when the scene stream is
//! first pulled and further pages only as the consumer keeps pulling.

use crate::config::StacConfig;
use crate::io::catalog::{SceneSearch, SceneStream};
use crate::io::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};
use crate::types::{BoundingBox, SarError, SarResult};
use std::collections::VecDeque;
use std::time::Duration;

/// Transport settings for [`StacClient`]
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Retries on transport errors and 5xx responses (default 3).
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further one.
    pub retry_base_delay: Duration,
    /// Items requested per page (default 100).
    pub page_size: u32,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            page_size: 100,
        }
    }
}

impl StacClientOptions {
    /// Delay before retry `attempt` (counting from 1), or `None` once the
    /// retry budget is spent. Doubles from `retry_base_delay` and saturates.
    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        Some(self.retry_base_delay.saturating_mul(factor))
    }
}

/// Client errors are final; server errors and anything else unexpected are retried
fn is_retryable(status: reqwest::StatusCode) -> bool {
    !status.is_client_error()
}

/// Source of result pages, split out so paging can run without a server
pub(crate) trait PageFetcher: Sync {
    fn fetch_first(&self, params: &StacSearchParams) -> SarResult<StacItemCollection>;

    /// Follow a `next` link; returns the page and the body that fetched it
    fn fetch_next(
        &self,
        link: &StacLink,
        previous: &StacSearchParams,
    ) -> SarResult<(StacItemCollection, StacSearchParams)>;
}

/// Client for the STAC API of one catalog and collection
pub struct StacClient {
    config: StacConfig,
    client: reqwest::blocking::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(config: StacConfig) -> SarResult<Self> {
        Self::with_options(config, StacClientOptions::default())
    }

    pub fn with_options(config: StacConfig, options: StacClientOptions) -> SarResult<Self> {
        config.validate()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(options.request_timeout)
            .user_agent(concat!("sarchange/", env!("CARGO_PKG_VERSION")))
            .build()?;

        log::debug!("STAC client for {} ({})", config.stac_url, config.collection);
        Ok(Self {
            config,
            client,
            options,
        })
    }

    pub fn config(&self) -> &StacConfig {
        &self.config
    }

    /// Total scene cap: the per-call limit wins over the configured one
    pub fn effective_limit(&self, limit: Option<usize>) -> Option<usize> {
        limit.or(self.config.limit)
    }

    /// Body of the first search request
    pub fn build_search_params(
        &self,
        bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> StacSearchParams {
        let page_size = match self.effective_limit(limit) {
            Some(cap) => (cap.min(self.options.page_size as usize)).max(1) as u32,
            None => self.options.page_size,
        };

        StacSearchParams::new()
            .collections(&[self.config.collection.as_str()])
            .bbox(bbox)
            .datetime(datetime)
            .limit(page_size)
            .query_eq("sat:orbit_state", self.config.orbit_state.to_string())
            .query_eq("sar:instrument_mode", self.config.instrument_mode.to_string())
    }

    /// Lazily iterate matching items page by page
    pub fn search_items(
        &self,
        bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> StacItemPages<'_> {
        let params = self.build_search_params(bbox, datetime, limit);
        StacItemPages::new(self, params, self.effective_limit(limit))
    }

    fn send_with_retry<F>(&self, what: &str, build: F) -> SarResult<StacItemCollection>
    where
        F: Fn() -> reqwest::blocking::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let err = match build().send() {
                Ok(resp) if resp.status().is_success() => {
                    let body = resp.text()?;
                    return serde_json::from_str(&body).map_err(|e| {
                        SarError::Catalog(format!("Parsing {} response: {}", what, e))
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().unwrap_or_default();
                    let err = SarError::Catalog(format!(
                        "{} returned HTTP {}: {}",
                        what,
                        status,
                        body.chars().take(500).collect::<String>()
                    ));
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => SarError::Http(e),
            };

            attempt += 1;
            match self.options.retry_delay(attempt) {
                Some(delay) => {
                    log::warn!("{} attempt {} failed ({}), retrying in {:?}", what, attempt, err, delay);
                    std::thread::sleep(delay);
                }
                None => return Err(err),
            }
        }
    }

    fn post_search(&self, url: &str, params: &StacSearchParams) -> SarResult<StacItemCollection> {
        log::debug!("POST {} {}", url, serde_json::to_string(params)?);
        self.send_with_retry("STAC search", || self.client.post(url).json(params))
    }
}

impl PageFetcher for StacClient {
    fn fetch_first(&self, params: &StacSearchParams) -> SarResult<StacItemCollection> {
        self.post_search(&self.config.search_url(), params)
    }

    fn fetch_next(
        &self,
        link: &StacLink,
        previous: &StacSearchParams,
    ) -> SarResult<(StacItemCollection, StacSearchParams)> {
        match link.next_body(previous)? {
            Some(body) => {
                let page = self.post_search(&link.href, &body)?;
                Ok((page, body))
            }
            None => {
                log::debug!("GET {}", link.href);
                let page = self.send_with_retry("STAC pagination", || self.client.get(&link.href))?;
                Ok((page, previous.clone()))
            }
        }
    }
}

impl SceneSearch for StacClient {
    fn search(
        &self,
        bbox: &BoundingBox,
        datetime: &str,
        limit: Option<usize>,
    ) -> SarResult<SceneStream<'_>> {
        let pages = self.search_items(bbox, datetime, limit);
        Ok(Box::new(pages.map(|item| item.and_then(StacItem::into_scene))))
    }
}

/// Item iterator that fetches result pages on demand
pub struct StacItemPages<'a> {
    fetcher: &'a dyn PageFetcher,
    params: StacSearchParams,
    buffer: VecDeque<StacItem>,
    next_link: Option<StacLink>,
    remaining: Option<usize>,
    started: bool,
    done: bool,
}

impl<'a> StacItemPages<'a> {
    pub(crate) fn new(
        fetcher: &'a dyn PageFetcher,
        params: StacSearchParams,
        remaining: Option<usize>,
    ) -> Self {
        Self {
            fetcher,
            params,
            buffer: VecDeque::new(),
            next_link: None,
            remaining,
            started: false,
            done: false,
        }
    }

    fn fetch_page(&mut self) -> SarResult<Option<StacItemCollection>> {
        if !self.started {
            self.started = true;
            return self.fetcher.fetch_first(&self.params).map(Some);
        }

        match self.next_link.take() {
            Some(link) => {
                let (page, body) = self.fetcher.fetch_next(&link, &self.params)?;
                self.params = body;
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }
}

impl Iterator for StacItemPages<'_> {
    type Item = SarResult<StacItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }

            if let Some(item) = self.buffer.pop_front() {
                if let Some(n) = self.remaining.as_mut() {
                    *n -= 1;
                }
                return Some(Ok(item));
            }

            if self.done {
                return None;
            }

            match self.fetch_page() {
                Ok(Some(page)) => {
                    log::debug!("Fetched STAC page with {} items", page.len());
                    self.next_link = page.next_link().cloned();
                    if page.is_empty() {
                        self.done = true;
                    }
                    self.buffer.extend(page.features);
                }
                Ok(None) => {
                    self.done = true;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
