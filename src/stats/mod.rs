pub mod class_stats;
pub mod counts;
