pub mod message;
pub mod obstacle;
pub mod sensor_sample;
pub mod settings;
pub mod warning;
