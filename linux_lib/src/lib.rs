pub mod bh1750;
pub mod logger;
