use crate::layer::KayveeLayer;
use crate::logger::Logger;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the global `tracing` bridge.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   installed next to [`KayveeLayer`] and events are also printed in the
///   human-readable format.
#[derive(Clone, Debug, Default)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

/// Install a [`Registry`] with a [`KayveeLayer`] around `logger` as the
/// global default subscriber.
///
/// **Returns**
/// - `Err(..)` if a global subscriber was already set.
pub fn init_tracing_with_config(
    logger: Arc<Logger>,
    config: LayerConfig,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let layer = KayveeLayer::new(logger);

    // Two arms because the layered subscriber types differ.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// [`init_tracing_with_config`] with [`LayerConfig::default`]: records only,
/// no extra console output.
pub fn init_tracing(logger: Arc<Logger>) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    init_tracing_with_config(logger, LayerConfig::default())
}
