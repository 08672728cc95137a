pub mod open_exchange_rates;
pub mod openai;
pub mod util;
