//! Read-only data sources
//!
//! Each data source takes its inputs from the manifest and returns a
//! `State` holding the inputs together with the computed outputs.

pub mod adb_elastic_daily_plans;
pub mod hbase_multimode_cms_url;
