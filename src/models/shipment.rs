use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One outbound transaction in the ledger (a row of the header sheet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentHeader {
    pub id: String,
    pub date: NaiveDate,
    pub destination: String,
    /// Empty for walk-in sales and legacy rows
    pub client: String,
    pub staff: String,
}

/// One product/quantity entry belonging to a shipment (a row of the line-item sheet)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentLineItem {
    pub shipment_id: String,
    pub product_name: String,
    pub quantity: u32,
}

/// A line item before it is attached to a shipment id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub product_name: String,
    pub quantity: u32,
}

impl LineItemInput {
    pub fn new(product_name: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
        }
    }

    pub fn for_shipment(&self, shipment_id: &str) -> ShipmentLineItem {
        ShipmentLineItem {
            shipment_id: shipment_id.to_string(),
            product_name: self.product_name.clone(),
            quantity: self.quantity,
        }
    }
}

/// Editable header fields; the id is never rewritten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderUpdate {
    pub date: NaiveDate,
    pub destination: String,
    pub client: String,
    pub staff: String,
}

impl HeaderUpdate {
    pub fn apply(&self, header: &mut ShipmentHeader) {
        header.date = self.date;
        header.destination = self.destination.clone();
        header.client = self.client.clone();
        header.staff = self.staff.clone();
    }
}

/// Header plus its line items, as shown on the detail page
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentDetail {
    pub header: ShipmentHeader,
    pub items: Vec<ShipmentLineItem>,
}
