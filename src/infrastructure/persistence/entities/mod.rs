pub mod ordpool_stats;
