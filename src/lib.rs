/// Pub/Sub bus: Broker, channels, events, sessions, telemetry.
pub mod bus;
/// Configuration loading (file + environment).
pub mod config;
/// Error types: bus errors re-exported from `flowbus-error`, settings errors.
pub mod error;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Bus API.
pub use bus::{
    BroadcastOptions, Broker, BuiltinChannel, BusSignal, ChannelInfo, ChannelOptions, Event,
    EventHandler, EventSubscribeOptions, EventSubscription, EventType, Handler, HandlerFailure,
    HandlerId, HealthStatus, Message, MessageId, Priority, PublishOptions, Session,
    SubscribeOptions, TypeMetrics, Unsubscribe,
};
/// Configuration.
pub use config::{BusConfig, Settings};
/// Operation errors and result types.
pub use error::{BusError, BusResult, ErrorExt, HandlerError, SettingsError, StatusCode};
/// Logging bootstrap.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
