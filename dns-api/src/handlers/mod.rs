pub mod entities;
pub mod ips;
pub mod macs;
pub mod meta;
pub mod networks;
pub mod records;
pub mod search;
pub mod zones;
