//! Media statistics shared by sources and sinks

pub mod statistic;

pub use statistic::{MediaStatisticInfo, StatisticsTable, SubStreamStatistic};
