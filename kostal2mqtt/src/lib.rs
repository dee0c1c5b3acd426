// externally visible interfaces
pub mod canonical_record;
pub mod device_client;
pub mod field_catalog;
pub mod home_assistant;
pub mod json_lines;
pub mod metric_collector;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod plenticore;
pub mod poll_cycle;
pub mod simple_mqtt;
pub mod value_mapper;

// internal interfaces
mod home_assistant_config;
