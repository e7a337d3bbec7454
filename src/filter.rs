use crate::area;
use crate::config::SearchQuery;
use crate::listing::Listing;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    PriceBelowMin,
    PriceAboveMax,
    PriceUnknown,
    NoFloorPlan,
    AreaUnknown,
    AreaTooSmall,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::PriceBelowMin => "price below minimum",
            RejectReason::PriceAboveMax => "price above maximum",
            RejectReason::PriceUnknown => "price could not be parsed",
            RejectReason::NoFloorPlan => "no floor plan",
            RejectReason::AreaUnknown => "area could not be read",
            RejectReason::AreaTooSmall => "area too small",
        };
        write!(f, "{reason}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

/// Global fallbacks applied when a query carries no override.
#[derive(Debug, Clone, Copy)]
pub struct FilterSettings {
    pub default_min_price: u32,
    pub default_max_price: u32,
    pub min_area_sqm: f64,
}

/// Price bounds are inclusive on both ends. Price checks run first so
/// out-of-range listings are settled without looking at the floor plan.
pub fn decide(listing: &Listing, query: &SearchQuery, settings: &FilterSettings) -> Verdict {
    let min_price = query.min_price.unwrap_or(settings.default_min_price);
    let max_price = query.max_price.unwrap_or(settings.default_max_price);

    let Some(price) = listing.price else {
        return Verdict::Reject(RejectReason::PriceUnknown);
    };
    if price.pounds_per_month < min_price {
        return Verdict::Reject(RejectReason::PriceBelowMin);
    }
    if price.pounds_per_month > max_price {
        return Verdict::Reject(RejectReason::PriceAboveMax);
    }

    if listing.floor_plan_url.is_none() {
        return Verdict::Reject(RejectReason::NoFloorPlan);
    }
    let Some(area_sqm) = listing.area_sqm else {
        return Verdict::Reject(RejectReason::AreaUnknown);
    };
    if area::too_small_area(area_sqm, settings.min_area_sqm) {
        return Verdict::Reject(RejectReason::AreaTooSmall);
    }

    Verdict::Accept
}
