pub mod sales;
pub mod shipment;
