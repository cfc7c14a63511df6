pub mod charger_payload;
pub mod clock;
pub mod models;
pub mod pagination;
pub mod reconcile;
