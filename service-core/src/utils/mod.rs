pub mod constant_time;
