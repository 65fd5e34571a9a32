//! Merchant records and the markers built from them

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::geo::LatLng;

/// One merchant as sent by the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantInput {
    /// Optional stable identity; the name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub available_baskets: u32,
    pub price: f64,
}

/// Parse a JSON array of merchant records
///
/// The whole input is rejected if a single record is invalid, so callers never
/// place half a list.
pub fn parse_merchants(json: &str) -> Result<Vec<MerchantInput>> {
    let merchants: Vec<MerchantInput> = serde_json::from_str(json)?;
    for (index, merchant) in merchants.iter().enumerate() {
        merchant
            .validate()
            .map_err(|e| Error::MalformedInput(format!("merchant #{index}: {e}")))?;
    }
    Ok(merchants)
}

impl MerchantInput {
    fn validate(&self) -> Result<()> {
        LatLng::new(self.latitude, self.longitude)?;
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::MalformedInput(format!(
                "price must be a non-negative number, got {}",
                self.price
            )));
        }
        Ok(())
    }

    /// Identity used for the marker built from this record
    pub fn merchant_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// What a popup shows about a merchant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayData {
    pub name: String,
    pub available_baskets: u32,
    pub price: f64,
}

impl DisplayData {
    /// Price with two decimals, e.g. `5.50`
    pub fn price_text(&self) -> String {
        format!("{:.2}", self.price)
    }

    pub fn baskets_text(&self) -> String {
        format!("{} basket(s) available", self.available_baskets)
    }
}

/// Structured popup body handed to the engine
///
/// Engines render these fields as text; nothing here is interpreted as markup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupContent {
    pub title: String,
    pub availability: String,
    pub price: String,
}

impl PopupContent {
    pub fn for_merchant(display: &DisplayData, currency_symbol: &str) -> Self {
        Self {
            title: display.name.clone(),
            availability: display.baskets_text(),
            price: format!("{} {}", display.price_text(), currency_symbol),
        }
    }
}

/// A merchant placed on the map
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub position: LatLng,
    pub display: DisplayData,
}

impl TryFrom<MerchantInput> for Marker {
    type Error = Error;

    fn try_from(input: MerchantInput) -> Result<Self> {
        let position = LatLng::new(input.latitude, input.longitude)
            .map_err(|e| Error::MalformedInput(e.to_string()))?;
        let id = input.merchant_id().to_string();
        Ok(Self {
            id,
            position,
            display: DisplayData {
                name: input.name,
                available_baskets: input.available_baskets,
                price: input.price,
            },
        })
    }
}
