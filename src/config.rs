use std::time::Duration;

use crate::ingest::QuantizeMode;

/// Deploy-time canvas parameters.
///
/// Width and height are configuration, not constants: deployed instances
/// have run different canvas geometries, and every coordinate bound in the
/// crate derives from these two values.
#[derive(Debug, Clone)]
pub struct CanvasConfig {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Minimum interval between accepted placements per connection.
    pub cooldown: Duration,
    /// Inclusive upper bound for the `placepixel` color index.
    pub max_color_index: u8,
    /// How off-palette pixels in uploads are treated.
    pub quantize: QuantizeMode,
    /// Interval between periodic state saves offered to hooks.
    pub persist_every: Duration,
    /// Interval between brand-usage histogram recomputations.
    pub histogram_every: Duration,
}

impl CanvasConfig {
    /// Expected byte length of a raw RGBA buffer for this canvas.
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 2000,
            height: 1000,
            cooldown: Duration::from_millis(5000),
            max_color_index: 32,
            quantize: QuantizeMode::Strict,
            persist_every: Duration::from_secs(15 * 60),
            histogram_every: Duration::from_secs(1),
        }
    }
}
