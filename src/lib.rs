use scraper::Html;
use tracing::{debug, error, info, warn};

pub mod area;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod ledger;
pub mod listing;
pub mod ocr;
pub mod zoopla;

pub use error::{PageError, WatcherError};

use crate::config::{SearchQuery, Subscriber};
use crate::delivery::DeliveryClient;
use crate::fetch::Fetcher;
use crate::filter::{FilterSettings, Verdict};
use crate::ledger::DedupLedger;
use crate::listing::{Address, Listing, ListingId, RentPrice};
use crate::ocr::OcrEngine;

/// Raw field text pulled from one detail page, before validation.
#[derive(Debug, PartialEq, Eq)]
pub struct RawFields {
    pub price_text: String,
    pub address: String,
    /// `None` means the page structurally has no floor plan.
    pub floor_plan_url: Option<String>,
}

/// Everything coupled to one listing site's markup and URL scheme.
pub trait SiteAdapter: Send + Sync {
    fn index_url(&self, query: &SearchQuery) -> String;
    fn detail_url(&self, id: ListingId) -> String;
    fn photos_url(&self, id: ListingId) -> String;
    fn list_listing_ids(&self, index: &Html) -> Vec<ListingId>;
    fn parse_listing_fields(&self, detail: &Html) -> Result<RawFields, PageError>;
    fn list_photo_urls(&self, photos: &Html) -> Vec<String>;
}

/// Drives one full poll cycle: discovery, extraction, filtering, dedup and
/// delivery. All cross-cycle state lives in the [`DedupLedger`].
pub struct Orchestrator {
    adapter: Box<dyn SiteAdapter>,
    fetcher: Box<dyn Fetcher>,
    ocr: Box<dyn OcrEngine>,
    ledger: DedupLedger,
    delivery: DeliveryClient,
    filter: FilterSettings,
    /// Re-check listings already in the skipped ledger.
    recheck_skipped: bool,
}

impl Orchestrator {
    pub fn new(
        adapter: Box<dyn SiteAdapter>,
        fetcher: Box<dyn Fetcher>,
        ocr: Box<dyn OcrEngine>,
        ledger: DedupLedger,
        delivery: DeliveryClient,
        filter: FilterSettings,
        recheck_skipped: bool,
    ) -> Orchestrator {
        Orchestrator {
            adapter,
            fetcher,
            ocr,
            ledger,
            delivery,
            filter,
            recheck_skipped,
        }
    }

    pub async fn run_cycle(
        &self,
        queries: &[SearchQuery],
        subscribers: &[Subscriber],
    ) -> Result<(), WatcherError> {
        for query in queries {
            let subscribed: Vec<&Subscriber> = subscribers
                .iter()
                .filter(|subscriber| subscriber.tags.contains(&query.tag))
                .collect();
            if subscribed.is_empty() {
                debug!(tag = %query.tag, "no subscribers, skipping query");
                continue;
            }

            // Index contents are time-sensitive, never served from cache.
            let index_url = self.adapter.index_url(query);
            let index_html = match self.fetcher.fetch_page(&index_url, false).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(tag = %query.tag, error = %e, "index fetch failed, skipping query");
                    continue;
                }
            };
            let ids = {
                let doc = Html::parse_document(&index_html);
                self.adapter.list_listing_ids(&doc)
            };
            info!(tag = %query.tag, "total {} listings", ids.len());

            for id in ids {
                if let Err(e) = self.process_listing(id, query, &subscribed).await {
                    warn!(%id, error = %e, "listing left for the next cycle");
                }
            }
        }
        Ok(())
    }

    /// One listing, end to end. Failures bubble up to [`Orchestrator::run_cycle`]
    /// where they are logged and contained; only structural absence is
    /// ledgered here.
    async fn process_listing(
        &self,
        id: ListingId,
        query: &SearchQuery,
        subscribed: &[&Subscriber],
    ) -> Result<(), WatcherError> {
        if !self.recheck_skipped && self.ledger.is_skipped(id).await? {
            debug!(%id, "already skipped, not re-fetching");
            return Ok(());
        }

        let Some(listing) = self.build_listing(id, query).await? else {
            info!(%id, "no floor plan on the page, skipping permanently");
            self.ledger.mark_skipped(id).await?;
            return Ok(());
        };

        match filter::decide(&listing, query, &self.filter) {
            Verdict::Reject(reason) => {
                // Price and area can change between cycles; rejects are
                // never ledgered.
                info!(%id, %reason, "rejected");
                return Ok(());
            }
            Verdict::Accept => {}
        }

        for subscriber in subscribed {
            if self.ledger.has_seen(id, &subscriber.id).await? {
                debug!(%id, subscriber = %subscriber.id, "already delivered");
                continue;
            }
            match self.delivery.send(subscriber, &listing).await {
                Ok(()) => {
                    self.ledger.mark_seen(id, &subscriber.id).await?;
                    info!(%id, subscriber = %subscriber.id, "delivered");
                }
                Err(e) => {
                    // Not marked seen: the pair is retried next cycle.
                    error!(%id, subscriber = %subscriber.id, error = %e, "delivery failed");
                }
            }
        }
        Ok(())
    }

    /// Fetch and assemble one listing, or `None` when the page structurally
    /// has no floor plan. Transient failures are errors.
    async fn build_listing(
        &self,
        id: ListingId,
        query: &SearchQuery,
    ) -> Result<Option<Listing>, WatcherError> {
        let link = self.adapter.detail_url(id);
        let detail_html = self.fetcher.fetch_page(&link, true).await?;
        let fields = {
            let doc = Html::parse_document(&detail_html);
            self.adapter.parse_listing_fields(&doc)
        }?;

        let Some(floor_plan_url) = fields.floor_plan_url else {
            return Ok(None);
        };

        let photos_html = self
            .fetcher
            .fetch_page(&self.adapter.photos_url(id), true)
            .await?;
        let photos = {
            let doc = Html::parse_document(&photos_html);
            self.adapter.list_photo_urls(&doc)
        };

        let floor_plan_image = self.fetcher.fetch_bytes(&floor_plan_url).await?;
        let area_sqm = match self.ocr.recognize(&floor_plan_image).await {
            Ok(text) => area::extract_area_sqm(&text),
            Err(e) => {
                // OCR quality varies per fetch; an engine failure reads as
                // area-unknown and the listing is re-checked next cycle.
                warn!(%id, error = %e, "floor plan recognition failed");
                None
            }
        };

        let price = match RentPrice::parse(&fields.price_text) {
            Ok(price) => Some(price),
            Err(e) => {
                warn!(%id, error = %e, "price text failed validation");
                None
            }
        };

        Ok(Some(Listing {
            id,
            link,
            price,
            address: Address::new(fields.address),
            floor_plan_url: Some(floor_plan_url),
            photos,
            area_sqm,
            tag: query.tag.clone(),
        }))
    }

    /// Diagnostic path: one listing end to end with no ledger reads or
    /// writes. Optionally delivers the result regardless of the verdict.
    pub async fn check_listing(
        &self,
        id: ListingId,
        deliver_to: Option<&Subscriber>,
    ) -> Result<(), WatcherError> {
        let query = SearchQuery {
            query_url: String::new(),
            tag: "test".to_string(),
            min_price: None,
            max_price: None,
        };
        let Some(listing) = self.build_listing(id, &query).await? else {
            info!(%id, "no floor plan on the page");
            return Ok(());
        };
        info!("built listing:\n{listing}");
        let verdict = filter::decide(&listing, &query, &self.filter);
        info!(?verdict, "filter verdict");
        if let Some(subscriber) = deliver_to {
            self.delivery.send(subscriber, &listing).await?;
            info!(subscriber = %subscriber.id, "delivered");
        }
        Ok(())
    }
}
