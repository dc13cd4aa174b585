//! Bunyan-style JSON output.

use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::fmt::MakeWriter;

/// Builder for the storage and formatting layers of JSON output.
pub struct JsonLayer;

impl JsonLayer {
    /// Layers writing one JSON object per event to `writer`.
    ///
    /// The storage layer must be added to the subscriber before the
    /// formatting layer so span fields are visible to it.
    pub fn layers<W>(name: &str, writer: W) -> (JsonStorageLayer, BunyanFormattingLayer<W>)
    where
        W: for<'a> MakeWriter<'a> + 'static,
    {
        (
            JsonStorageLayer,
            BunyanFormattingLayer::new(name.to_string(), writer),
        )
    }
}
