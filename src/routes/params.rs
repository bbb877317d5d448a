use serde::Deserialize;
use utoipa::ToSchema;

/// Catalog pages are a fixed size.
pub const PAGE_SIZE: i64 = 12;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductQuery {
    /// Case-insensitive substring match against the product name.
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    /// Inclusive `"min-max"` range in minor units.
    pub price: Option<String>,
    pub sort: Option<CatalogSort>,
    pub page: Option<i64>,
}

impl ProductQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * PAGE_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogSort {
    PriceLow,
    PriceHigh,
    Newest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRange {
    pub min: i64,
    pub max: i64,
}

impl PriceRange {
    /// Split on the first hyphen, both bounds required and numeric.
    /// `None` marks a malformed range; callers reject it instead of letting
    /// it silently match nothing.
    pub fn parse(raw: &str) -> Option<Self> {
        let (min, max) = raw.split_once('-')?;
        let min = min.trim().parse::<i64>().ok()?;
        let max = max.trim().parse::<i64>().ok()?;
        Some(Self { min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_range_parses_inclusive_bounds() {
        assert_eq!(
            PriceRange::parse("50-150"),
            Some(PriceRange { min: 50, max: 150 })
        );
        assert_eq!(
            PriceRange::parse("0-0"),
            Some(PriceRange { min: 0, max: 0 })
        );
    }

    #[test]
    fn price_range_rejects_malformed_input() {
        assert_eq!(PriceRange::parse("cheap"), None);
        assert_eq!(PriceRange::parse("50-"), None);
        assert_eq!(PriceRange::parse("-150"), None);
        assert_eq!(PriceRange::parse("abc-150"), None);
        assert_eq!(PriceRange::parse("50-xyz"), None);
    }

    #[test]
    fn page_defaults_to_first() {
        let query = ProductQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.offset(), 0);

        let query = ProductQuery {
            page: Some(0),
            ..Default::default()
        };
        assert_eq!(query.page(), 1);

        let query = ProductQuery {
            page: Some(3),
            ..Default::default()
        };
        assert_eq!(query.offset(), 2 * PAGE_SIZE);
    }
}
