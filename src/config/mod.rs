pub mod bus;
pub mod settings;

pub use bus::BusConfig;
pub use settings::Settings;
