//! Zoopla markup coupling. Every selector and embedded-blob path the site
//! dictates lives in this module, so markup changes touch one place.

use crate::config::SearchQuery;
use crate::error::PageError;
use crate::listing::ListingId;
use crate::{RawFields, SiteAdapter};
use itertools::Itertools;
use lazy_static::lazy_static;
use scraper::{Html, Selector};

pub const BASE_ADDRESS: &str = "https://www.zoopla.co.uk";
pub const BASE_CDN: &str = "https://lc.zoocdn.com/";

// Fixed refine suffix appended to every index query; the per-query part of
// the URL comes from configuration.
const INDEX_REFINE_PARAMS: &str = "&beds_max=2&page_size=100&include_shared_accommodation=false&price_frequency=per_month&results_sort=newest_listings&search_source=refine&added=24_hours";

const E: &str = "Invalid selector";
lazy_static! {
    static ref LISTING_LINK: Selector =
        Selector::parse(r#"a[data-testid="listing-details-link"]"#).expect(E);
    static ref PRICE: Selector = Selector::parse(r#"span[data-testid="price"]"#).expect(E);
    static ref ADDRESS: Selector = Selector::parse(r#"span[data-testid="address-label"]"#).expect(E);
    static ref NEXT_DATA: Selector = Selector::parse(r#"script[id="__NEXT_DATA__"]"#).expect(E);
    static ref IMG: Selector = Selector::parse("img").expect(E);
}

#[derive(Debug)]
pub struct Zoopla;

impl Zoopla {
    fn listing_id_from_href(href: &str) -> Option<ListingId> {
        // Example: /to-rent/details/60395544/ ---> 60395544
        let trimmed = href.trim_end_matches('/');
        let id = trimmed.rsplit('/').next()?;
        id.parse().ok().map(ListingId)
    }
}

impl SiteAdapter for Zoopla {
    fn index_url(&self, query: &SearchQuery) -> String {
        format!("{BASE_ADDRESS}{}{INDEX_REFINE_PARAMS}", query.query_url)
    }

    fn detail_url(&self, id: ListingId) -> String {
        format!("{BASE_ADDRESS}/to-rent/details/{id}/")
    }

    fn photos_url(&self, id: ListingId) -> String {
        format!("{BASE_ADDRESS}/to-rent/details/photos/{id}")
    }

    fn list_listing_ids(&self, index: &Html) -> Vec<ListingId> {
        index
            .select(&LISTING_LINK)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(Zoopla::listing_id_from_href)
            .sorted()
            .dedup()
            .collect()
    }

    fn parse_listing_fields(&self, detail: &Html) -> Result<RawFields, PageError> {
        let price_text = detail
            .select(&PRICE)
            .next()
            .ok_or(PageError::MissingField("price"))?
            .text()
            .collect::<String>()
            .trim()
            .to_string();

        let address = detail
            .select(&ADDRESS)
            .next()
            .ok_or(PageError::MissingField("address"))?
            .text()
            .collect::<String>()
            .trim()
            .to_string();

        let next_data = detail
            .select(&NEXT_DATA)
            .next()
            .ok_or(PageError::MissingField("__NEXT_DATA__"))?
            .inner_html();
        let next_data: serde_json::Value = serde_json::from_str(&next_data)
            .map_err(|_| PageError::EmbeddedData("not valid json"))?;
        let details = next_data
            .pointer("/props/pageProps/listingDetails")
            .ok_or(PageError::EmbeddedData("listingDetails missing"))?;

        // An absent or empty image array is a structural fact about the
        // listing, not a parse failure.
        let floor_plan_url = match details
            .pointer("/floorPlan/image")
            .and_then(|image| image.as_array())
            .filter(|descriptors| !descriptors.is_empty())
        {
            Some(descriptors) => {
                let filename = descriptors[0]
                    .get("filename")
                    .and_then(|f| f.as_str())
                    .ok_or(PageError::EmbeddedData("floor plan filename missing"))?;
                Some(format!("{BASE_CDN}{filename}"))
            }
            None => None,
        };

        Ok(RawFields {
            price_text,
            address,
            floor_plan_url,
        })
    }

    fn list_photo_urls(&self, photos: &Html) -> Vec<String> {
        photos
            .select(&IMG)
            .filter(|img| !img.value().attr("style").unwrap_or("").is_empty())
            .filter_map(|img| img.value().attr("src"))
            .map(ToString::to_string)
            .collect()
    }
}
