use crate::area;
use std::fmt;

/// Stable external identifier of a listing, taken from its detail-page URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingId(pub u64);

impl ListingId {
    /// SQLite has no unsigned 64-bit column type.
    pub(crate) fn as_db(self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monthly rent in pounds, parsed from the advertised price text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentPrice {
    pub pounds_per_month: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("not a monthly rent price: {0:?}")]
pub struct PriceError(pub String);

impl RentPrice {
    /// Accepts only the advertised form "£" + digits with optional thousand
    /// separators + one space + "pcm". Weekly prices, other currencies and
    /// malformed digit runs are an error, never a price of zero.
    pub fn parse(text: &str) -> Result<RentPrice, PriceError> {
        let (_, digits) = lazy_regex::regex_captures!(r"^£(\d{1,3}(?:,\d{3})+|\d+) pcm$", text)
            .ok_or_else(|| PriceError(text.to_string()))?;
        let pounds_per_month = digits
            .replace(',', "")
            .parse()
            .map_err(|_| PriceError(text.to_string()))?;
        Ok(RentPrice { pounds_per_month })
    }
}

impl fmt::Display for RentPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "£{} pcm", self.pounds_per_month)
    }
}

/// Display address as shown on the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub display: String,
}

impl Address {
    pub fn new(display: impl Into<String>) -> Address {
        Address {
            display: display.into(),
        }
    }

    /// External map-search link derived from the display text.
    pub fn maps_link(&self) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(self.display.as_bytes()).collect();
        format!("https://www.google.com/maps/search/{encoded}")
    }
}

/// One rental listing, assembled fresh each poll cycle. Only its id survives
/// the cycle, in the ledgers.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: ListingId,
    pub link: String,
    /// `None` when the advertised price text failed validation.
    pub price: Option<RentPrice>,
    pub address: Address,
    pub floor_plan_url: Option<String>,
    /// Photo URLs in page order, floor plan excluded.
    pub photos: Vec<String>,
    pub area_sqm: Option<f64>,
    /// Tag of the search query that surfaced this listing.
    pub tag: String,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Id      : {}", self.id)?;
        writeln!(f, "Link    : {}", self.link)?;
        match self.price {
            Some(price) => writeln!(f, "Price   : {price}")?,
            None => writeln!(f, "Price   : unknown")?,
        }
        writeln!(f, "Address : {}", self.address.display)?;
        writeln!(f, "Area    : {}", area::format_area(self.area_sqm))?;
        writeln!(f, "Photos  : {}", self.photos.len())?;
        write!(f, "Tag     : {}", self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn monthly_price_with_thousand_separator() {
        assert_eq!(
            RentPrice::parse("£2,500 pcm"),
            Ok(RentPrice {
                pounds_per_month: 2500
            })
        );
    }

    #[test]
    fn plain_digit_run() {
        assert_eq!(
            RentPrice::parse("£950 pcm"),
            Ok(RentPrice {
                pounds_per_month: 950
            })
        );
    }

    #[test]
    fn weekly_marker_is_rejected() {
        assert!(RentPrice::parse("£2,500 pw").is_err());
    }

    #[test]
    fn wrong_currency_is_rejected() {
        assert!(RentPrice::parse("$2,500 pcm").is_err());
    }

    #[test]
    fn malformed_digit_runs_are_rejected() {
        assert!(RentPrice::parse("£2,50 pcm").is_err());
        assert!(RentPrice::parse("£ pcm").is_err());
        assert!(RentPrice::parse("£2500pcm").is_err());
        assert!(RentPrice::parse("POA").is_err());
    }

    #[test]
    fn maps_link_encodes_the_address() {
        let address = Address::new("1 Example Street, London");
        assert_eq!(
            address.maps_link(),
            "https://www.google.com/maps/search/1+Example+Street%2C+London"
        );
    }
}
