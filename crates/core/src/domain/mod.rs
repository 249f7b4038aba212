pub mod country;
pub mod stock;
