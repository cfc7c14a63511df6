pub mod charger_http;
pub mod csv_store;
pub mod replay_file;
