//! Listing data structures.

use serde::{Deserialize, Serialize};

/// A listing card as seen in one search-result snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    /// Numeric marketplace item identifier
    pub listing_id: String,

    /// Accessible label of the card link
    pub title: Option<String>,

    /// Parsed asking price
    pub price: Option<f64>,

    /// First card image
    pub image_url: Option<String>,

    /// Absolute item URL
    pub url: String,
}

/// Data read from a listing's own page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDetails {
    pub description: Option<String>,
}

/// A finalized listing, ready for the output dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub listing_id: String,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub url: String,
    pub description: Option<String>,
    /// Search-result page the listing was found on
    pub source_url: String,
}

impl ListingSummary {
    /// Merge detail data and provenance into an emit-ready record.
    pub fn finalize(self, details: ListingDetails, source_url: &str) -> ListingRecord {
        ListingRecord {
            listing_id: self.listing_id,
            title: self.title,
            price: self.price,
            image_url: self.image_url,
            url: self.url,
            description: details.description,
            source_url: source_url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_carries_details_and_source() {
        let summary = ListingSummary {
            listing_id: "42".to_string(),
            title: Some("Road bike".to_string()),
            price: Some(120.0),
            image_url: None,
            url: "https://www.facebook.com/marketplace/item/42/".to_string(),
        };

        let record = summary.finalize(
            ListingDetails {
                description: Some("Barely used".to_string()),
            },
            "https://www.facebook.com/marketplace/nyc/bikes",
        );

        assert_eq!(record.listing_id, "42");
        assert_eq!(record.description.as_deref(), Some("Barely used"));
        assert_eq!(
            record.source_url,
            "https://www.facebook.com/marketplace/nyc/bikes"
        );
    }

    #[test]
    fn record_serializes_absent_fields_as_null() {
        let record = ListingSummary {
            listing_id: "7".to_string(),
            title: None,
            price: None,
            image_url: None,
            url: "https://www.facebook.com/marketplace/item/7/".to_string(),
        }
        .finalize(ListingDetails::default(), "https://example.com/search");

        let value = serde_json::to_value(&record).unwrap();
        assert!(value["price"].is_null());
        assert!(value["description"].is_null());
        assert_eq!(value["source_url"], "https://example.com/search");
    }
}
