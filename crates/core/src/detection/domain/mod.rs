pub mod detection_parameters;
pub mod interval_tracker;
pub mod motion_model;
