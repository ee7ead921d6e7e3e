// Record processing: derived columns, rule evaluation, and rejection counts

pub mod derived;
pub mod quality_metrics;
pub mod rules;
