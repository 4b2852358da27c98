pub mod exchange_rate;
pub mod price;
