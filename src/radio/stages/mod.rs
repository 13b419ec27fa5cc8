pub mod common;
pub mod compressor;
pub mod equalizer;
pub mod filter;
pub mod oversampler;
pub mod saturator;

use crate::radio::error::ChainResult;

/// One processing stage of the radio chain.
///
/// Stages run in place on a mono block and keep their state across calls.
pub trait Stage: Send + 'static {
    fn name(&self) -> &'static str;

    /// Process a block in place. An error means the block content is not
    /// usable and the caller decides what to do with it.
    fn process_block(&mut self, block: &mut [f32]) -> ChainResult<()>;

    /// Drop all filter and envelope history, keeping the configuration.
    fn reset(&mut self);
}
